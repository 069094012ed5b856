//! Closed error taxonomy for the plugin, wire-visible as [`ProtoError`].

use crate::proto::ProtoError;

/// The fixed set of error kinds the plugin can produce, carrying the
/// wire-stable numeric codes from the plugin/FSM protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginErrorKind {
    /// Reused as the generic "unexpected error" code for any error that
    /// propagates out of a handler without being mapped to a more specific
    /// kind; matches the source's behavior of converting thrown errors to
    /// `{code: 1, ...}`, the same code used for real timeouts.
    PluginTimeout = 1,
    Marshal = 2,
    Unmarshal = 3,
    FailedPluginRead = 4,
    FailedPluginWrite = 5,
    InvalidPluginRespId = 6,
    UnexpectedFsmToPlugin = 7,
    InvalidFsmToPluginMessage = 8,
    InsufficientFunds = 9,
    FromAny = 10,
    InvalidMessageCast = 11,
    InvalidAddress = 12,
    InvalidAmount = 13,
    TxFeeBelowStateLimit = 14,
}

impl PluginErrorKind {
    pub const fn code(self) -> u32 {
        self as u32
    }

    fn canonical(self, detail: &str) -> String {
        match self {
            Self::PluginTimeout => "a plugin timeout occurred".to_string(),
            Self::Marshal => format!("marshal() failed with err: {detail}"),
            Self::Unmarshal => format!("unmarshal() failed with err: {detail}"),
            Self::FailedPluginRead => format!("a plugin read failed with err: {detail}"),
            Self::FailedPluginWrite => format!("a plugin write failed with err: {detail}"),
            Self::InvalidPluginRespId => "plugin response id is invalid".to_string(),
            Self::UnexpectedFsmToPlugin => format!("unexpected FSM to plugin: {detail}"),
            Self::InvalidFsmToPluginMessage => format!("invalid FSM to plugin: {detail}"),
            Self::InsufficientFunds => "insufficient funds".to_string(),
            Self::FromAny => format!("fromAny() failed with err: {detail}"),
            Self::InvalidMessageCast => "the message cast failed".to_string(),
            Self::InvalidAddress => "address is invalid".to_string(),
            Self::InvalidAmount => "amount is invalid".to_string(),
            Self::TxFeeBelowStateLimit => "tx.fee is below state limit".to_string(),
        }
    }
}

/// A plugin error carrying its kind and any interpolated detail.
#[derive(Debug, Clone)]
pub struct PluginError {
    pub kind: PluginErrorKind,
    pub detail: String,
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.kind.canonical(&self.detail))
    }
}

impl std::error::Error for PluginError {}

impl PluginError {
    pub fn new(kind: PluginErrorKind) -> Self {
        Self {
            kind,
            detail: String::new(),
        }
    }

    pub fn with_detail(kind: PluginErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Converts an unexpected, otherwise-unmapped error into the generic
    /// `{code: 1, module: "plugin"}` reply the engine wraps thrown errors in.
    pub fn unexpected(detail: impl Into<String>) -> Self {
        Self::with_detail(PluginErrorKind::PluginTimeout, detail.into())
    }
}

impl From<PluginError> for ProtoError {
    fn from(err: PluginError) -> Self {
        ProtoError {
            code: err.kind.code(),
            module: "plugin".to_string(),
            msg: err.kind.canonical(&err.detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_the_wire_taxonomy() {
        let cases = [
            (PluginErrorKind::PluginTimeout, 1),
            (PluginErrorKind::Marshal, 2),
            (PluginErrorKind::Unmarshal, 3),
            (PluginErrorKind::FailedPluginRead, 4),
            (PluginErrorKind::FailedPluginWrite, 5),
            (PluginErrorKind::InvalidPluginRespId, 6),
            (PluginErrorKind::UnexpectedFsmToPlugin, 7),
            (PluginErrorKind::InvalidFsmToPluginMessage, 8),
            (PluginErrorKind::InsufficientFunds, 9),
            (PluginErrorKind::FromAny, 10),
            (PluginErrorKind::InvalidMessageCast, 11),
            (PluginErrorKind::InvalidAddress, 12),
            (PluginErrorKind::InvalidAmount, 13),
            (PluginErrorKind::TxFeeBelowStateLimit, 14),
        ];
        for (kind, code) in cases {
            assert_eq!(kind.code(), code);
        }
    }

    #[test]
    fn proto_error_carries_module_and_message() {
        let err = PluginError::new(PluginErrorKind::InsufficientFunds);
        let proto: ProtoError = err.into();
        assert_eq!(proto.code, 9);
        assert_eq!(proto.module, "plugin");
        assert_eq!(proto.msg, "insufficient funds");
    }

    #[test]
    fn detail_is_interpolated_into_canonical_message() {
        let err = PluginError::with_detail(PluginErrorKind::Unmarshal, "bad byte 0xFF");
        let proto: ProtoError = err.into();
        assert_eq!(proto.msg, "unmarshal() failed with err: bad byte 0xFF");
    }
}
