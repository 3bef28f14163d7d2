/// A serial, as sent to clients in events such as `wl_callback.done`
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Serial(pub(crate) u32);

impl From<Serial> for u32 {
    fn from(serial: Serial) -> u32 {
        serial.0
    }
}

/// A counter for generating serials, for use in the client protocol
///
/// The [`Display`](crate::server::Display) owns one counter, shared by all its
/// clients. The counter skips 0 and wraps around on overflow, ensuring it can
/// run for as long as needed.
#[derive(Debug)]
pub struct SerialCounter {
    serial: u32,
}

impl Default for SerialCounter {
    fn default() -> Self {
        SerialCounter { serial: 1 }
    }
}

impl SerialCounter {
    /// Retrieve the next serial from the counter
    pub fn next_serial(&mut self) -> Serial {
        if self.serial == 0 {
            self.serial = 1;
        }
        let serial = Serial(self.serial);
        self.serial = self.serial.wrapping_add(1);
        serial
    }
}
