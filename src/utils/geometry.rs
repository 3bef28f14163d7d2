use std::marker::PhantomData;

/// Type-level marker for the surface-local logical coordinate space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Logical;

/// Type-level marker for the buffer coordinate space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Buffer;

/// An integer rectangle in the `Kind` coordinate space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle<Kind> {
    /// Horizontal position of the top-left corner
    pub x: i32,
    /// Vertical position of the top-left corner
    pub y: i32,
    /// Width of the rectangle
    pub width: i32,
    /// Height of the rectangle
    pub height: i32,
    _kind: PhantomData<Kind>,
}

impl<Kind> Rectangle<Kind> {
    /// Create a rectangle from its top-left corner and size
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Rectangle {
            x,
            y,
            width,
            height,
            _kind: PhantomData,
        }
    }

    /// Checks whether given point is inside the rectangle
    pub fn contains(&self, x: i32, y: i32) -> bool {
        // widen to avoid overflows with client provided values
        let (x, y) = (x as i64, y as i64);
        let (left, top) = (self.x as i64, self.y as i64);
        x >= left && y >= top && x < left + self.width as i64 && y < top + self.height as i64
    }
}
