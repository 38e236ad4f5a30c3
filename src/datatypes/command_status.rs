use num_enum::{FromPrimitive, IntoPrimitive};
use std::fmt;

/// The command_status field of an SMPP response header. `ESME_ROK` signals
/// success; everything else is an error the SMSC is reporting back. Statuses
/// outside the v3.4 catalogue (vendor extensions) survive decode through the
/// `Other` variant instead of failing the session.
#[derive(FromPrimitive, IntoPrimitive)]
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CommandStatus {
    /// No error (ESME_ROK)
    Ok = 0x0000_0000,
    /// Message length is invalid
    InvalidMsgLength = 0x0000_0001,
    /// Command length is invalid
    InvalidCommandLength = 0x0000_0002,
    /// Invalid command id
    InvalidCommandId = 0x0000_0003,
    /// Incorrect BIND status for given command
    IncorrectBindStatus = 0x0000_0004,
    /// ESME already in bound state
    AlreadyBound = 0x0000_0005,
    /// Invalid priority flag
    InvalidPriorityFlag = 0x0000_0006,
    /// Invalid registered delivery flag
    InvalidRegisteredDeliveryFlag = 0x0000_0007,
    /// System error
    SystemError = 0x0000_0008,
    /// Invalid source address
    InvalidSourceAddress = 0x0000_000A,
    /// Invalid destination address
    InvalidDestinationAddress = 0x0000_000B,
    /// Message id is invalid
    InvalidMessageId = 0x0000_000C,
    /// Bind failed
    BindFailed = 0x0000_000D,
    /// Invalid password
    InvalidPassword = 0x0000_000E,
    /// Invalid system id
    InvalidSystemId = 0x0000_000F,
    /// cancel_sm failed
    CancelSmFailed = 0x0000_0011,
    /// replace_sm failed
    ReplaceSmFailed = 0x0000_0013,
    /// Message queue full
    MessageQueueFull = 0x0000_0014,
    /// Invalid service type
    InvalidServiceType = 0x0000_0015,
    /// Invalid number of destinations
    InvalidNumberOfDestinations = 0x0000_0033,
    /// Invalid distribution list name
    InvalidDistributionListName = 0x0000_0034,
    /// Destination flag is invalid
    InvalidDestinationFlag = 0x0000_0040,
    /// Invalid 'submit with replace' request
    InvalidSubmitWithReplace = 0x0000_0042,
    /// Invalid esm_class field data
    InvalidEsmClass = 0x0000_0043,
    /// Cannot submit to distribution list
    CannotSubmitToDistributionList = 0x0000_0044,
    /// submit_sm or submit_multi failed
    SubmitFailed = 0x0000_0045,
    /// Invalid source address TON
    InvalidSourceAddressTon = 0x0000_0048,
    /// Invalid source address NPI
    InvalidSourceAddressNpi = 0x0000_0049,
    /// Invalid destination address TON
    InvalidDestinationAddressTon = 0x0000_0050,
    /// Invalid destination address NPI
    InvalidDestinationAddressNpi = 0x0000_0051,
    /// Invalid system_type field
    InvalidSystemType = 0x0000_0053,
    /// Invalid replace_if_present flag
    InvalidReplaceIfPresentFlag = 0x0000_0054,
    /// Invalid number of messages
    InvalidNumberOfMessages = 0x0000_0055,
    /// Throttling error: ESME has exceeded allowed message limits
    ThrottlingError = 0x0000_0058,
    /// Invalid scheduled delivery time
    InvalidScheduledDeliveryTime = 0x0000_0061,
    /// Invalid message validity period (expiry time)
    InvalidExpiryTime = 0x0000_0062,
    /// Predefined message invalid or not found
    InvalidPredefinedMessageId = 0x0000_0063,
    /// ESME receiver temporary app error
    ReceiverTemporaryAppError = 0x0000_0064,
    /// ESME receiver permanent app error
    ReceiverPermanentAppError = 0x0000_0065,
    /// ESME receiver reject message error
    ReceiverRejectMessageError = 0x0000_0066,
    /// query_sm request failed
    QuerySmFailed = 0x0000_0067,
    /// Error in the optional part of the PDU body
    InvalidOptionalPartStream = 0x0000_00C0,
    /// Optional parameter not allowed
    OptionalParameterNotAllowed = 0x0000_00C1,
    /// Invalid parameter length
    InvalidParameterLength = 0x0000_00C2,
    /// Expected optional parameter missing
    MissingOptionalParameter = 0x0000_00C3,
    /// Invalid optional parameter value
    InvalidOptionalParameterValue = 0x0000_00C4,
    /// Delivery failure (data_sm_resp)
    DeliveryFailure = 0x0000_00FE,
    /// Unknown error
    UnknownError = 0x0000_00FF,
    /// Reserved or vendor-specific status
    #[num_enum(catch_all)]
    Other(u32),
}

impl CommandStatus {
    /// Human-readable description, mirroring the names in the v3.4
    /// specification's error code table.
    pub fn description(&self) -> &'static str {
        match self {
            CommandStatus::Ok => "OK",
            CommandStatus::InvalidMsgLength => "invalid message length",
            CommandStatus::InvalidCommandLength => "invalid command length",
            CommandStatus::InvalidCommandId => "invalid command id",
            CommandStatus::IncorrectBindStatus => "incorrect bind status for given command",
            CommandStatus::AlreadyBound => "already in bound state",
            CommandStatus::InvalidPriorityFlag => "invalid priority flag",
            CommandStatus::InvalidRegisteredDeliveryFlag => "invalid registered delivery flag",
            CommandStatus::SystemError => "system error",
            CommandStatus::InvalidSourceAddress => "invalid source address",
            CommandStatus::InvalidDestinationAddress => "invalid destination address",
            CommandStatus::InvalidMessageId => "invalid message id",
            CommandStatus::BindFailed => "bind failed",
            CommandStatus::InvalidPassword => "invalid password",
            CommandStatus::InvalidSystemId => "invalid system id",
            CommandStatus::CancelSmFailed => "cancel_sm failed",
            CommandStatus::ReplaceSmFailed => "replace_sm failed",
            CommandStatus::MessageQueueFull => "message queue full",
            CommandStatus::InvalidServiceType => "invalid service type",
            CommandStatus::InvalidNumberOfDestinations => "invalid number of destinations",
            CommandStatus::InvalidDistributionListName => "invalid distribution list name",
            CommandStatus::InvalidDestinationFlag => "invalid destination flag",
            CommandStatus::InvalidSubmitWithReplace => "invalid 'submit with replace' request",
            CommandStatus::InvalidEsmClass => "invalid esm_class field data",
            CommandStatus::CannotSubmitToDistributionList => {
                "cannot submit to distribution list"
            }
            CommandStatus::SubmitFailed => "submit_sm or submit_multi failed",
            CommandStatus::InvalidSourceAddressTon => "invalid source address ton",
            CommandStatus::InvalidSourceAddressNpi => "invalid source address npi",
            CommandStatus::InvalidDestinationAddressTon => "invalid destination address ton",
            CommandStatus::InvalidDestinationAddressNpi => "invalid destination address npi",
            CommandStatus::InvalidSystemType => "invalid system_type field",
            CommandStatus::InvalidReplaceIfPresentFlag => "invalid replace_if_present flag",
            CommandStatus::InvalidNumberOfMessages => "invalid number of messages",
            CommandStatus::ThrottlingError => "throttling error",
            CommandStatus::InvalidScheduledDeliveryTime => "invalid scheduled delivery time",
            CommandStatus::InvalidExpiryTime => "invalid message validity period",
            CommandStatus::InvalidPredefinedMessageId => {
                "predefined message invalid or not found"
            }
            CommandStatus::ReceiverTemporaryAppError => "receiver temporary app error",
            CommandStatus::ReceiverPermanentAppError => "receiver permanent app error",
            CommandStatus::ReceiverRejectMessageError => "receiver reject message error",
            CommandStatus::QuerySmFailed => "query_sm request failed",
            CommandStatus::InvalidOptionalPartStream => {
                "error in the optional part of the pdu body"
            }
            CommandStatus::OptionalParameterNotAllowed => "optional parameter not allowed",
            CommandStatus::InvalidParameterLength => "invalid parameter length",
            CommandStatus::MissingOptionalParameter => "expected optional parameter missing",
            CommandStatus::InvalidOptionalParameterValue => "invalid optional parameter value",
            CommandStatus::DeliveryFailure => "delivery failure",
            CommandStatus::UnknownError => "unknown error",
            CommandStatus::Other(_) => "reserved or vendor-specific status",
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == CommandStatus::Ok
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:#010x})",
            self.description(),
            u32::from(*self)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_status_roundtrip() {
        assert_eq!(CommandStatus::from(0u32), CommandStatus::Ok);
        assert_eq!(CommandStatus::from(0x58u32), CommandStatus::ThrottlingError);
        assert_eq!(u32::from(CommandStatus::ThrottlingError), 0x58);
        assert_eq!(
            CommandStatus::from(0x0Bu32),
            CommandStatus::InvalidDestinationAddress
        );
    }

    #[test]
    fn vendor_status_survives() {
        let status = CommandStatus::from(0x0400_0001u32);
        assert_eq!(status, CommandStatus::Other(0x0400_0001));
        assert_eq!(u32::from(status), 0x0400_0001);
    }

    #[test]
    fn display_is_human_readable() {
        let rendered = CommandStatus::ThrottlingError.to_string();
        assert!(rendered.contains("throttling error"));
        assert!(rendered.contains("0x00000058"));
    }
}
