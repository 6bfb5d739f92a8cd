//! Byte sink towards the host transport currently bound to a protocol adapter
//! (USB CDC, Bluetooth SPP, Telnet).

/// Non-blocking writer; implementations buffer or drop when the link is saturated.
pub trait HostSink {
    /// Queue `bytes` for the host.
    fn write(&mut self, bytes: &[u8]);

    /// Push buffered output to the link.
    fn flush(&mut self) {}

    /// Convenience wrapper over [`HostSink::write`].
    fn write_str(&mut self, text: &str) {
        self.write(text.as_bytes());
    }
}
