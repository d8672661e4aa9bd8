//! Instance directory boundary
//!
//! The provider API client that lists and mutates compute instances is an
//! external collaborator. The bridge consults it for exactly two things
//! before connecting: is the instance running, and which address do we
//! dial. It also derives the login identity from the image's OS family
//! when the operator does not supply one.

use serde::{Deserialize, Serialize};

/// Provider-reported lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    Stopping,
    Stopped,
    ShuttingDown,
    Terminated,
}

impl InstanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
        }
    }
}

/// OS family of the instance image, used to derive the default login user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsFamily {
    AmazonLinux,
    Ubuntu,
    Debian,
    Centos,
    Fedora,
    Windows,
    Unknown,
}

impl Default for OsFamily {
    fn default() -> Self {
        Self::Unknown
    }
}

impl OsFamily {
    /// Conventional login user for images of this family. `Unknown` gets
    /// the provider-wide default.
    pub fn default_username(&self) -> &'static str {
        match self {
            Self::AmazonLinux => "ec2-user",
            Self::Ubuntu => "ubuntu",
            Self::Debian => "admin",
            Self::Centos => "centos",
            Self::Fedora => "fedora",
            Self::Windows => "administrator",
            Self::Unknown => "ec2-user",
        }
    }
}

/// What the directory knows about one instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Console-local instance id or the provider-assigned id
    pub id: String,
    /// Display name, when tagged
    #[serde(default)]
    pub name: Option<String>,
    pub state: InstanceState,
    #[serde(default)]
    pub public_ip: Option<String>,
    #[serde(default)]
    pub private_ip: Option<String>,
    pub instance_type: String,
    #[serde(default)]
    pub os_family: OsFamily,
}

impl InstanceRecord {
    pub fn is_running(&self) -> bool {
        self.state == InstanceState::Running
    }

    /// Address to dial for a shell, public IP preferred.
    pub fn connect_address(&self) -> Option<&str> {
        self.public_ip
            .as_deref()
            .filter(|ip| !ip.is_empty())
            .or_else(|| self.private_ip.as_deref().filter(|ip| !ip.is_empty()))
    }
}

/// Lookup surface over the instance directory.
pub trait InstanceDirectory: Send + Sync {
    /// Find by console id or provider id.
    fn find_instance(&self, id_or_provider_id: &str) -> Option<InstanceRecord>;
}

/// In-memory instance directory for tests and the demo seed.
pub struct MemoryInstanceDirectory {
    instances: parking_lot::RwLock<Vec<InstanceRecord>>,
}

impl MemoryInstanceDirectory {
    pub fn new() -> Self {
        Self {
            instances: parking_lot::RwLock::new(Vec::new()),
        }
    }

    pub fn with_instances(instances: Vec<InstanceRecord>) -> Self {
        Self {
            instances: parking_lot::RwLock::new(instances),
        }
    }

    pub fn insert(&self, record: InstanceRecord) {
        self.instances.write().push(record);
    }
}

impl Default for MemoryInstanceDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceDirectory for MemoryInstanceDirectory {
    fn find_instance(&self, id_or_provider_id: &str) -> Option<InstanceRecord> {
        self.instances
            .read()
            .iter()
            .find(|record| record.id == id_or_provider_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(state: InstanceState, public_ip: Option<&str>, private_ip: Option<&str>) -> InstanceRecord {
        InstanceRecord {
            id: "i-123".into(),
            name: Some("web-1".into()),
            state,
            public_ip: public_ip.map(String::from),
            private_ip: private_ip.map(String::from),
            instance_type: "t3.micro".into(),
            os_family: OsFamily::Ubuntu,
        }
    }

    #[test]
    fn connect_address_prefers_public_ip() {
        let record = instance(InstanceState::Running, Some("203.0.113.7"), Some("10.0.0.5"));
        assert_eq!(record.connect_address(), Some("203.0.113.7"));
    }

    #[test]
    fn connect_address_falls_back_to_private_ip() {
        let record = instance(InstanceState::Running, None, Some("10.0.0.5"));
        assert_eq!(record.connect_address(), Some("10.0.0.5"));

        let record = instance(InstanceState::Running, Some(""), Some("10.0.0.5"));
        assert_eq!(record.connect_address(), Some("10.0.0.5"));
    }

    #[test]
    fn connect_address_missing_when_no_ip_assigned() {
        let record = instance(InstanceState::Pending, None, None);
        assert_eq!(record.connect_address(), None);
    }

    #[test]
    fn default_usernames_per_os_family() {
        assert_eq!(OsFamily::AmazonLinux.default_username(), "ec2-user");
        assert_eq!(OsFamily::Ubuntu.default_username(), "ubuntu");
        assert_eq!(OsFamily::Unknown.default_username(), "ec2-user");
    }
}
