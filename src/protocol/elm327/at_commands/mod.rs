//! AT and ST command parsing.
//!
//! Commands arrive upper-cased and stripped of whitespace. Prefixes are matched
//! longest first, so `ATDESC` wins over `ATD` and `ATMA` over `ATM`.
use crate::infra::hex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AtCommand {
    /// `AT@DESC`/`ATDESC`: print the device description.
    Describe,
    /// `ATSP<digit>`: select a protocol.
    SetProtocol(u8),
    /// `ATAT<0|1|2>`: adaptive timing.
    AdaptiveTiming(bool),
    /// `ATST<hex>`: explicit timeout in units of 4 ms.
    SetTimeout(u32),
    /// `ATDP[N]`: describe the current protocol, by name or by number.
    DescribeProtocol { numeric: bool },
    /// `ATPC`: protocol close.
    ProtocolClose,
    /// `ATRV`: read the supply voltage.
    ReadVoltage,
    /// `AT@1`: print the OBDLink identity.
    DeviceIdentity,
    /// `ATSH<hex>`: request header.
    SetHeader(u32),
    /// `ATMA`: monitor all frames.
    MonitorAll(bool),
    Echo(bool),
    Memory(bool),
    Linefeed(bool),
    Whitespace(bool),
    Headers(bool),
    ShowDlc(bool),
    /// `ATZ`: reset every setting.
    Reset,
    /// `ATI`: print the ELM identity.
    Identify,
    /// Accepted without effect (`ATCRA`, `ATCP`, `ATAR`, `ATV`, `ATPP`).
    Ignored,
    /// `STDI`: print the device description.
    StDeviceIdentity,
}

impl AtCommand {
    /// Parse one upper-cased command; `None` for anything unknown or malformed.
    pub fn parse(command: &str) -> Option<Self> {
        if command.starts_with("ST") {
            return Self::parse_st(command);
        }
        let rest = command.strip_prefix("AT")?;
        let flag = || rest.ends_with('1');

        let parsed = if rest.starts_with("DESC") || rest.starts_with("@DESC") {
            AtCommand::Describe
        } else if let Some(arg) = rest.strip_prefix("SP") {
            // ATSPA6 style "try protocol" forms select their last digit.
            AtCommand::SetProtocol(*arg.as_bytes().last()?)
        } else if let Some(arg) = rest.strip_prefix("AT") {
            AtCommand::AdaptiveTiming(arg != "0")
        } else if rest == "0" || rest == "1" {
            AtCommand::AdaptiveTiming(rest == "1")
        } else if let Some(arg) = rest.strip_prefix("ST") {
            AtCommand::SetTimeout(hex::parse_u32(arg)?)
        } else if let Some(arg) = rest.strip_prefix("DP") {
            AtCommand::DescribeProtocol {
                numeric: arg.starts_with('N'),
            }
        } else if rest.starts_with("PC") {
            AtCommand::ProtocolClose
        } else if rest.starts_with("RV") {
            AtCommand::ReadVoltage
        } else if rest.starts_with("CRA") {
            AtCommand::Ignored
        } else if rest.starts_with("@1") {
            AtCommand::DeviceIdentity
        } else if let Some(arg) = rest.strip_prefix("SH") {
            AtCommand::SetHeader(parse_header(arg)?)
        } else if rest.starts_with("CP") || rest.starts_with("AR") {
            AtCommand::Ignored
        } else if rest.starts_with("MA") {
            AtCommand::MonitorAll(flag())
        } else if rest.starts_with('E') {
            AtCommand::Echo(flag())
        } else if rest.starts_with('M') {
            AtCommand::Memory(flag())
        } else if rest.starts_with('L') {
            AtCommand::Linefeed(flag())
        } else if rest.starts_with('S') {
            AtCommand::Whitespace(flag())
        } else if rest.starts_with('H') {
            AtCommand::Headers(flag())
        } else if rest.starts_with('V') || rest.starts_with("PP") {
            AtCommand::Ignored
        } else if rest.starts_with('D') {
            AtCommand::ShowDlc(flag())
        } else if rest.starts_with('Z') {
            AtCommand::Reset
        } else if rest.starts_with('I') {
            AtCommand::Identify
        } else {
            return None;
        };
        Some(parsed)
    }

    fn parse_st(command: &str) -> Option<Self> {
        command
            .starts_with("STDI")
            .then_some(AtCommand::StDeviceIdentity)
    }
}

/// Header argument of `ATSH`.
///
/// A `0x` prefix or one leading zero is dropped. Five or more digits are a 29-bit
/// header missing its `18` priority byte, unless all eight digits are given.
pub fn parse_header(arg: &str) -> Option<u32> {
    if let Some(digits) = arg.strip_prefix("0X") {
        hex::parse_u32(digits)
    } else if let Some(digits) = arg.strip_prefix('0').filter(|d| !d.is_empty()) {
        hex::parse_u32(digits)
    } else if (5..=6).contains(&arg.len()) {
        let low = hex::parse_u32(arg)?;
        Some((0x18 << (arg.len() * 4)) | low)
    } else {
        hex::parse_u32(arg)
    }
}
