use std::fmt;
use uuid::Uuid;

/// Opaque transport address of a peripheral
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeripheralId(pub String);

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A peripheral identified by discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralRecord {
    pub identifier: PeripheralId,
    pub display_name: Option<String>,
}

impl PeripheralRecord {
    pub fn new(identifier: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            identifier: PeripheralId(identifier.into()),
            display_name: display_name.filter(|name| !name.is_empty()),
        }
    }

    /// Name for operator-facing output
    pub fn name_or_unknown(&self) -> &str {
        self.display_name.as_deref().unwrap_or("Unknown")
    }
}

impl fmt::Display for PeripheralRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name_or_unknown(), self.identifier)
    }
}

/// What a scan observed for one peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub record: PeripheralRecord,
    pub service_ids: Vec<Uuid>,
}

/// Scan criteria, evaluated against each advertisement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanFilter {
    /// Advertised local name contains the substring
    NameContains(String),
    /// Advertisement lists the service
    Service(Uuid),
}

impl ScanFilter {
    pub fn matches(&self, adv: &Advertisement) -> bool {
        match self {
            Self::NameContains(needle) => adv
                .record
                .display_name
                .as_deref()
                .is_some_and(|name| name.contains(needle.as_str())),
            Self::Service(uuid) => adv.service_ids.contains(uuid),
        }
    }
}

impl fmt::Display for ScanFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NameContains(name) => write!(f, "name contains \"{}\"", name),
            Self::Service(uuid) => write!(f, "service {}", uuid),
        }
    }
}

/// GATT characteristic capability flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CharacteristicProperties(u8);

impl CharacteristicProperties {
    pub const READ: Self = Self(0x01);
    pub const WRITE: Self = Self(0x02);
    pub const WRITE_WITHOUT_RESPONSE: Self = Self(0x04);
    pub const NOTIFY: Self = Self(0x08);
    pub const INDICATE: Self = Self(0x10);

    const NAMES: [(Self, &'static str); 5] = [
        (Self::READ, "read"),
        (Self::WRITE, "write"),
        (Self::WRITE_WITHOUT_RESPONSE, "write-without-response"),
        (Self::NOTIFY, "notify"),
        (Self::INDICATE, "indicate"),
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl fmt::Display for CharacteristicProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicDescriptor {
    pub characteristic_id: Uuid,
    pub properties: CharacteristicProperties,
}

/// A GATT service as enumerated after connecting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub service_id: Uuid,
    pub characteristics: Vec<CharacteristicDescriptor>,
}

impl ServiceDescriptor {
    pub fn has_characteristic(&self, id: Uuid) -> bool {
        self.characteristics
            .iter()
            .any(|c| c.characteristic_id == id)
    }
}

/// Item type of the notification queue a link feeds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Notification(Vec<u8>),
    Disconnected,
}

/// Lifecycle of one connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Validating,
    Subscribing,
    Active,
    Closing,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Legal forward transitions; `Failed` is reachable from every
    /// non-terminal state.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Failed)
                | (Idle, Connecting)
                | (Connecting, Validating)
                | (Validating, Subscribing)
                | (Subscribing, Active)
                | (Active, Closing)
                | (Closing, Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Operator-facing events published by the session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Status(StatusMessage),
    StateChanged(SessionState),
    Battery(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}
