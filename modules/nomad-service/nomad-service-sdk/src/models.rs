//! Domain models shared between handlers and collaborators

use std::fmt;

/// Health status reported to the auto-scaling group for an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceHealth {
    /// Instance is in service.
    Healthy,
    /// Instance should be replaced.
    Unhealthy,
}

impl InstanceHealth {
    /// Value as expected by `set-instance-health --health-status`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "Healthy",
            Self::Unhealthy => "Unhealthy",
        }
    }
}

impl fmt::Display for InstanceHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::Unhealthy => f.write_str("unhealthy"),
        }
    }
}

/// A running instance of a service, as published by service discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceInstance {
    /// Bare host (IPv4, IPv6 or DNS name), without brackets.
    pub address: String,
    /// TCP port.
    pub port: u16,
}

impl ServiceInstance {
    /// Create a new instance.
    #[must_use]
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// `host:port` authority, bracketing IPv6 literals.
    #[must_use]
    pub fn authority(&self) -> String {
        if self.address.contains(':') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }

    /// URL of the instance's reload endpoint.
    #[must_use]
    pub fn reload_url(&self) -> String {
        format!("http://{}/reload", self.authority())
    }
}

/// Lifecycle transition carried by an auto-scaling notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleTransition {
    /// `autoscaling:EC2_INSTANCE_LAUNCHING`
    Launching,
    /// `autoscaling:EC2_INSTANCE_TERMINATING`
    Terminating,
    /// Any other transition name.
    Other(String),
}

impl LifecycleTransition {
    /// Parse the `LifecycleTransition` field of an auto-scaling message.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "autoscaling:EC2_INSTANCE_LAUNCHING" => Self::Launching,
            "autoscaling:EC2_INSTANCE_TERMINATING" => Self::Terminating,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// A lifecycle hook notification for one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    /// EC2 instance id, e.g. `i-0123456789abcdef0`.
    pub instance_id: String,
    /// Transition the instance is going through.
    pub transition: LifecycleTransition,
    /// Name of the lifecycle hook holding the transition.
    pub hook_name: String,
    /// Auto-scaling group the instance belongs to.
    pub auto_scaling_group: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_url_ipv4() {
        let inst = ServiceInstance::new("10.0.1.17", 8080);
        assert_eq!(inst.reload_url(), "http://10.0.1.17:8080/reload");
    }

    #[test]
    fn reload_url_brackets_ipv6() {
        let inst = ServiceInstance::new("2a01:4f8::1", 8080);
        assert_eq!(inst.reload_url(), "http://[2a01:4f8::1]:8080/reload");
    }

    #[test]
    fn parses_known_transitions() {
        assert_eq!(
            LifecycleTransition::parse("autoscaling:EC2_INSTANCE_TERMINATING"),
            LifecycleTransition::Terminating
        );
        assert_eq!(
            LifecycleTransition::parse("autoscaling:EC2_INSTANCE_LAUNCHING"),
            LifecycleTransition::Launching
        );
        assert_eq!(
            LifecycleTransition::parse("autoscaling:TEST_NOTIFICATION"),
            LifecycleTransition::Other("autoscaling:TEST_NOTIFICATION".to_owned())
        );
    }

    #[test]
    fn health_status_values() {
        assert_eq!(InstanceHealth::Healthy.as_str(), "Healthy");
        assert_eq!(InstanceHealth::Unhealthy.to_string(), "unhealthy");
    }
}
