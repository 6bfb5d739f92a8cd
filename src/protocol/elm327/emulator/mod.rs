//! ELM327 emulator bound to one bus and one host sink.
//!
//! Two task contexts meet here: the input task ([`ElmRunner`]) dispatching host
//! commands and polling the response timeout, and the receive dispatcher delivering
//! CAN frames through [`FrameConsumer`]. Both go through the single session lock,
//! acquired with a bound; contended work is dropped and logged.
use embassy_sync::{
    blocking_mutex::raw::{CriticalSectionRawMutex, RawMutex},
    channel::Receiver,
    mutex::{Mutex, MutexGuard},
};
use embassy_time::Instant;
use futures_util::Future;

use crate::error::ElmError;
use crate::infra::{bounded::within, hex};
use crate::protocol::elm327::{
    at_commands::AtCommand,
    format::format_frame_output,
    input::{CommandLine, LineBuffer},
    session::{ElmSession, PendingRequest, Protocol},
    timing::TimeoutEstimator,
    DEFAULT_TIMEOUT_MS, DEVICE_DESC, ELM_ID, INPUT_POLL_TIMEOUT_MS, MIN_EXPLICIT_TIMEOUT_MS,
    OBDLINK_DESC, REPORTED_VOLTAGE, RESPONSE_GRACE_MS, SESSION_LOCK_TIMEOUT_MS,
};
use crate::protocol::transport::{
    bus_manager::BusManager,
    can_frame::CanFrame,
    can_id::CanId,
    traits::{
        can_controller::CanController, clock::Clock, frame_consumer::FrameConsumer,
        host_sink::HostSink, settings_store::SettingsStore,
    },
};

/// Standard-addressing ECU response ids.
const STANDARD_RESPONSE_IDS: core::ops::RangeInclusive<u32> = 0x7E8..=0x7EF;
/// Extended-addressing ECU response ids.
const EXTENDED_RESPONSE_IDS: core::ops::RangeInclusive<u32> = 0x18DA_F100..=0x18DA_F1FF;
/// Flow control: continue to send, no block limit, no separation time.
const FLOW_CONTROL_PAYLOAD: [u8; 8] = [0x30, 0, 0, 0, 0, 0, 0, 0];

/// Bus work left over once a command has been answered, run after the session lock
/// is released.
enum FollowUp {
    None,
    Bitrate(u32),
    Request(CanFrame),
}

//==================================================================================STATE
/// Snapshot of the emulator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElmStatus {
    pub session: ElmSession,
    pub pending: Option<PendingRequest>,
    pub estimator: TimeoutEstimator,
}

struct ElmCore<W> {
    session: ElmSession,
    pending: Option<PendingRequest>,
    estimator: TimeoutEstimator,
    last_command: CommandLine,
    sink: W,
}

impl<W: HostSink> ElmCore<W> {
    fn write(&mut self, text: &str) {
        self.sink.write_str(text);
    }

    fn reply_ok(&mut self) {
        let end = self.session.end_ok();
        self.write(end);
    }

    /// Text followed by the bare prompt.
    fn reply_text(&mut self, text: &str) {
        let end = self.session.end_text();
        self.write(text);
        self.write(end);
    }

    /// Close the exchange: clear the request and print the prompt once.
    fn close_out(&mut self, no_data: bool) {
        self.pending = None;
        if no_data {
            self.write("NO DATA");
        }
        let prompt = self.session.prompt();
        self.write(prompt);
        self.sink.flush();
    }
}

fn elapsed_ms(now: Instant, since: Instant) -> u64 {
    now.checked_duration_since(since).map_or(0, |d| d.as_millis())
}

//==================================================================================EMULATOR
pub struct Elm327<'a, C, S, K, W>
where
    C: CanController,
    S: SettingsStore,
    K: Clock,
    W: HostSink,
{
    manager: &'a BusManager<C, S, K>,
    bus: u8,
    core: Mutex<CriticalSectionRawMutex, ElmCore<W>>,
}

impl<'a, C, S, K, W> Elm327<'a, C, S, K, W>
where
    C: CanController,
    S: SettingsStore,
    K: Clock,
    W: HostSink,
{
    /// Emulator talking on `bus` and answering into `sink`, with default settings.
    pub fn new(manager: &'a BusManager<C, S, K>, bus: u8, sink: W) -> Self {
        Self {
            manager,
            bus,
            core: Mutex::new(ElmCore {
                session: ElmSession::new(),
                pending: None,
                estimator: TimeoutEstimator::new(DEFAULT_TIMEOUT_MS),
                last_command: CommandLine::new(),
                sink,
            }),
        }
    }

    pub fn bus(&self) -> u8 {
        self.bus
    }

    /// Current state, `None` when the session lock stays contended.
    pub async fn status(&self) -> Option<ElmStatus> {
        let core = self.lock_core().await.ok()?;
        Some(ElmStatus {
            session: core.session,
            pending: core.pending,
            estimator: core.estimator,
        })
    }

    //==================================================================================COMMANDS
    /// Interpret one command line.
    ///
    /// Input is upper-cased and stripped of whitespace; an empty line repeats the last
    /// command. AT/ST commands update the session, 4 to 7 hex digits form a PID
    /// request, anything else is answered with `?`.
    pub async fn handle(&self, command: &str) -> Result<(), ElmError> {
        let mut guard = self.lock_core().await?;
        let core = &mut *guard;

        let mut line = CommandLine::new();
        let mut overflow = false;
        for c in command.chars().filter(|c| !c.is_ascii_whitespace()) {
            overflow |= line.push(c.to_ascii_uppercase()).is_err();
        }
        if overflow {
            core.reply_text("?");
            return Err(ElmError::InvalidCommand);
        }

        if line.is_empty() {
            if core.last_command.is_empty() {
                return Ok(());
            }
            line = core.last_command.clone();
        } else {
            core.last_command = line.clone();
        }

        #[cfg(feature = "defmt")]
        defmt::debug!("ELM327: command {}", line.as_str());
        let follow_up = self.dispatch(core, &line);
        core.sink.flush();
        drop(guard);

        match follow_up? {
            FollowUp::None => Ok(()),
            FollowUp::Bitrate(bitrate) => {
                if let Err(_err) = self.manager.request_bitrate(self.bus, bitrate).await {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("ELM327: bitrate {} not applied: {}", bitrate, _err);
                }
                Ok(())
            }
            FollowUp::Request(frame) => self.send_request(&frame).await,
        }
    }

    fn dispatch(&self, core: &mut ElmCore<W>, command: &str) -> Result<FollowUp, ElmError> {
        if command.starts_with("AT") || command.starts_with("ST") {
            match AtCommand::parse(command) {
                Some(at) => Ok(self.apply(core, at)),
                None => {
                    #[cfg(feature = "defmt")]
                    defmt::error!("ELM327: unknown command {}", command);
                    core.reply_text("?");
                    Err(ElmError::InvalidCommand)
                }
            }
        } else if hex::is_hex(command) && (4..=7).contains(&command.len()) {
            self.request_pid(core, command).map(FollowUp::Request)
        } else {
            core.reply_text("?");
            Err(ElmError::InvalidCommand)
        }
    }

    fn apply(&self, core: &mut ElmCore<W>, command: AtCommand) -> FollowUp {
        let mut follow_up = FollowUp::None;
        match command {
            AtCommand::Describe => {
                core.write(DEVICE_DESC);
                core.reply_ok();
            }
            AtCommand::SetProtocol(digit) => {
                if let Some(protocol) = Protocol::from_digit(digit) {
                    core.session.protocol = protocol;
                    core.session.header = protocol.broadcast_header();
                    core.session.extended = protocol.is_extended();
                    follow_up = FollowUp::Bitrate(protocol.bitrate());
                }
                core.reply_ok();
            }
            AtCommand::AdaptiveTiming(enabled) => {
                core.session.adaptive = enabled;
                core.estimator.reset(core.session.timeout_ms);
                core.reply_ok();
            }
            AtCommand::SetTimeout(units) => {
                let timeout = units.saturating_mul(4);
                core.session.timeout_ms = if timeout == 0 {
                    DEFAULT_TIMEOUT_MS
                } else {
                    timeout.max(MIN_EXPLICIT_TIMEOUT_MS)
                };
                core.estimator.reset(core.session.timeout_ms);
                core.reply_ok();
            }
            AtCommand::DescribeProtocol { numeric } => {
                let protocol = core.session.protocol;
                if numeric {
                    let mut digit = [0u8; 4];
                    core.write(protocol.digit().encode_utf8(&mut digit));
                } else {
                    core.write(protocol.description());
                }
                core.reply_ok();
            }
            AtCommand::ProtocolClose | AtCommand::Ignored => core.reply_ok(),
            AtCommand::ReadVoltage => {
                core.write(REPORTED_VOLTAGE);
                if core.session.whitespace {
                    core.write(" ");
                }
                core.reply_ok();
            }
            AtCommand::DeviceIdentity => core.reply_text(OBDLINK_DESC),
            AtCommand::SetHeader(header) => {
                core.session.header = header;
                core.session.extended = header > 0x7FF;
                #[cfg(feature = "defmt")]
                defmt::debug!("ELM327: header {:x}", header);
                core.reply_ok();
            }
            AtCommand::MonitorAll(on) => {
                core.session.monitor = on;
                core.reply_ok();
            }
            AtCommand::Echo(on) => {
                core.session.echo = on;
                core.reply_ok();
            }
            AtCommand::Memory(on) => {
                core.session.memory = on;
                core.reply_ok();
            }
            AtCommand::Linefeed(on) => {
                core.session.linefeed = on;
                core.reply_ok();
            }
            AtCommand::Whitespace(on) => {
                core.session.whitespace = on;
                core.reply_ok();
            }
            AtCommand::Headers(on) => {
                core.session.headers = on;
                core.reply_ok();
            }
            AtCommand::ShowDlc(on) => {
                core.session.show_dlc = on;
                core.reply_ok();
            }
            AtCommand::Reset => {
                core.session = ElmSession::new();
                core.pending = None;
                core.estimator.reset(DEFAULT_TIMEOUT_MS);
                core.reply_text(ELM_ID);
            }
            AtCommand::Identify => core.reply_text(ELM_ID),
            AtCommand::StDeviceIdentity => core.reply_text(DEVICE_DESC),
        }
        follow_up
    }

    /// Encode `<mode><pid>[expected]` into a request frame and arm the exchange.
    fn request_pid(&self, core: &mut ElmCore<W>, command: &str) -> Result<CanFrame, ElmError> {
        let (mode_digits, rest) = command.split_at(2);
        let pid_digits = if rest.len() >= 4 { 4 } else { 2 };
        let (pid_text, expected_text) = rest.split_at(pid_digits);

        let mode = hex::parse_u8(mode_digits).ok_or(ElmError::InvalidCommand)?;
        let pid = hex::parse_u32(pid_text).ok_or(ElmError::InvalidCommand)? as u16;
        let expected = hex::parse_u32(expected_text)
            .map(|n| n as u8)
            .filter(|&n| n > 0);

        let mut payload = [0u8; 8];
        payload[1] = mode;
        if pid_digits == 2 {
            payload[0] = 2;
            payload[2] = pid as u8;
        } else {
            payload[0] = 3;
            payload[2..4].copy_from_slice(&pid.to_be_bytes());
        }
        let frame = CanFrame::new(CanId::new(core.session.header, core.session.extended), &payload);

        core.pending = Some(PendingRequest::new(mode, pid, expected, self.manager.clock().now()));
        #[cfg(feature = "defmt")]
        defmt::debug!("ELM327: mode {:x} pid {:x}", mode, pid);

        Ok(frame)
    }

    /// Queue an armed request; a refused send disarms it and answers `CAN ERROR`.
    async fn send_request(&self, frame: &CanFrame) -> Result<(), ElmError> {
        let Err(err) = self.manager.send(self.bus, frame).await else {
            return Ok(());
        };
        #[cfg(feature = "defmt")]
        defmt::error!("ELM327: failed to send request: {}", err);
        if let Ok(mut core) = self.lock_core().await {
            core.pending = None;
            core.reply_text("CAN ERROR");
            core.sink.flush();
        }
        Err(ElmError::SendFailed(err))
    }

    //==================================================================================CAN_FRAMES
    /// Ingest one frame from the emulator's bus; returns whether it was printed.
    pub async fn handle_can_frame(&self, frame: &CanFrame) -> bool {
        let Ok(mut guard) = self.lock_core().await else {
            return false;
        };
        let core = &mut *guard;

        let id = frame.id.raw();
        if !core.session.monitor {
            let expected = if core.session.extended {
                &EXTENDED_RESPONSE_IDS
            } else {
                &STANDARD_RESPONSE_IDS
            };
            if !expected.contains(&id) {
                return false;
            }
        }

        let line = format_frame_output(&core.session, frame);
        core.write(&line);
        core.sink.flush();

        if core.session.monitor {
            return true;
        }

        let now = self.manager.clock().now();
        let satisfied = match core.pending.as_mut() {
            Some(pending) => {
                let first = pending.frames == 0;
                pending.track_frame(frame.payload(), now);
                pending.processed = true;
                if first && core.session.adaptive {
                    let sample = elapsed_ms(now, pending.start);
                    core.session.timeout_ms = core.estimator.update(sample);
                }
                pending.is_satisfied()
            }
            None => false,
        };
        if satisfied {
            core.close_out(false);
        }
        drop(guard);

        let pci = frame.payload().first().copied().unwrap_or(0);
        if pci >> 4 == 0x1 {
            self.send_flow_control(frame).await;
        }
        true
    }

    /// Ask the responder of a first frame to send the remaining segments.
    async fn send_flow_control(&self, first_frame: &CanFrame) {
        let id = first_frame.id.raw();
        let target = if first_frame.id.is_extended() {
            CanId::extended((id & !0xFF) | 0xF0)
        } else {
            CanId::new(id ^ 0x8, false)
        };
        let frame = CanFrame::new(target, &FLOW_CONTROL_PAYLOAD);
        if let Err(_err) = self.manager.send(self.bus, &frame).await {
            #[cfg(feature = "defmt")]
            defmt::error!("ELM327: failed to send flow control: {}", _err);
        }
    }

    //==================================================================================TIMEOUT
    /// Close a stalled exchange. Polled periodically by the input task.
    ///
    /// After at least one response the exchange closes once the grace period passes
    /// without a newer frame. With no response it closes after `timeout_ms`, feeding
    /// the elapsed time into the estimator and printing `NO DATA`.
    pub async fn check_for_timeout(&self) {
        let Ok(mut guard) = self.lock_core().await else {
            return;
        };
        let core = &mut *guard;
        if core.session.monitor {
            return;
        }
        let Some(pending) = core.pending else {
            return;
        };
        let now = self.manager.clock().now();

        match pending.last_response {
            Some(last) if pending.frames > 0 => {
                if elapsed_ms(now, last) > RESPONSE_GRACE_MS {
                    core.close_out(false);
                }
            }
            _ => {
                let elapsed = elapsed_ms(now, pending.start);
                if elapsed > core.session.timeout_ms as u64 {
                    if !pending.processed && core.session.adaptive {
                        core.session.timeout_ms = core.estimator.update(elapsed);
                    }
                    #[cfg(feature = "defmt")]
                    defmt::debug!("ELM327: no response after {} ms", elapsed);
                    core.close_out(true);
                }
            }
        }
    }

    //==================================================================================INTERNALS
    async fn echo(&self, byte: u8) {
        if let Ok(mut core) = self.lock_core().await {
            if core.session.echo {
                core.sink.write(&[byte]);
            }
        }
    }

    async fn lock_core(
        &self,
    ) -> Result<MutexGuard<'_, CriticalSectionRawMutex, ElmCore<W>>, ElmError> {
        match within(self.manager.clock(), SESSION_LOCK_TIMEOUT_MS, self.core.lock()).await {
            Some(guard) => Ok(guard),
            None => {
                #[cfg(feature = "defmt")]
                defmt::warn!("ELM327: session lock timeout");
                Err(ElmError::LockTimeout)
            }
        }
    }
}

impl<C, S, K, W> FrameConsumer for Elm327<'_, C, S, K, W>
where
    C: CanController,
    S: SettingsStore,
    K: Clock,
    W: HostSink,
{
    fn consume<'b>(&'b self, bus: u8, frame: &'b CanFrame) -> impl Future<Output = bool> + 'b {
        async move { bus == self.bus && self.handle_can_frame(frame).await }
    }
}

//==================================================================================RUNNER
/// Input task of the emulator: pumps host bytes through the line discipline and
/// polls the response timeout in between.
pub struct ElmRunner<'a, C, S, K, W, M, const N: usize>
where
    C: CanController,
    S: SettingsStore,
    K: Clock,
    W: HostSink,
    M: RawMutex,
{
    emulator: &'a Elm327<'a, C, S, K, W>,
    input: Receiver<'a, M, u8, N>,
    line: LineBuffer,
}

impl<'a, C, S, K, W, M, const N: usize> ElmRunner<'a, C, S, K, W, M, N>
where
    C: CanController,
    S: SettingsStore,
    K: Clock,
    W: HostSink,
    M: RawMutex,
{
    pub fn new(emulator: &'a Elm327<'a, C, S, K, W>, input: Receiver<'a, M, u8, N>) -> Self {
        Self {
            emulator,
            input,
            line: LineBuffer::new(),
        }
    }

    /// Feed one host byte: echo it when enabled, dispatch the line it completes.
    pub async fn feed_byte(&mut self, byte: u8) {
        self.emulator.echo(byte).await;
        if let Some(line) = self.line.push(byte) {
            if let Err(_err) = self.emulator.handle(&line).await {
                #[cfg(feature = "defmt")]
                defmt::debug!("ELM327: command {} failed: {}", line.as_str(), _err);
            }
        }
    }

    /// Run forever.
    pub async fn drive(&mut self) {
        #[cfg(feature = "defmt")]
        defmt::info!("ELM327: emulator started on bus {}", self.emulator.bus());
        let emulator = self.emulator;
        let clock = emulator.manager.clock();
        loop {
            if let Some(byte) = within(clock, INPUT_POLL_TIMEOUT_MS, self.input.receive()).await {
                self.feed_byte(byte).await;
            }
            emulator.check_for_timeout().await;
        }
    }
}
