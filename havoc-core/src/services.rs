use crate::config::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Managed through `service <name> <action>`.
    Service,
    /// A bare process, only killed or checked.
    Process,
}

/// A unit havoc knows how to manage and the node role that hosts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: &'static str,
    pub kind: UnitKind,
    pub role: Role,
}

pub const NOVA_API: &str = "nova-api";
pub const NOVA_SCHEDULER: &str = "nova-scheduler";
pub const RABBITMQ: &str = "rabbitmq-server";
pub const MYSQL: &str = "mysql";
pub const NOVA_NETWORK: &str = "nova-network";
pub const DNSMASQ: &str = "dnsmasq";
pub const NOVA_COMPUTE: &str = "nova-compute";
pub const LIBVIRT: &str = "libvirt-bin";

const fn unit(name: &'static str, kind: UnitKind, role: Role) -> ServiceDescriptor {
    ServiceDescriptor { name, kind, role }
}

pub const CATALOG: &[ServiceDescriptor] = &[
    unit(NOVA_API, UnitKind::Service, Role::Controller),
    unit(NOVA_SCHEDULER, UnitKind::Service, Role::Controller),
    unit(RABBITMQ, UnitKind::Service, Role::Controller),
    unit(MYSQL, UnitKind::Service, Role::Controller),
    unit(NOVA_NETWORK, UnitKind::Service, Role::Network),
    unit(DNSMASQ, UnitKind::Process, Role::Network),
    unit(NOVA_COMPUTE, UnitKind::Service, Role::Compute),
    unit(LIBVIRT, UnitKind::Service, Role::Compute),
];

pub fn lookup(name: &str) -> Option<&'static ServiceDescriptor> {
    CATALOG.iter().find(|d| d.name == name)
}

pub fn for_role(role: Role) -> impl Iterator<Item = &'static ServiceDescriptor> {
    CATALOG.iter().filter(move |d| d.role == role)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("dnsmasq").map(|d| d.kind), Some(UnitKind::Process));
        assert_eq!(lookup("nova-api").map(|d| d.role), Some(Role::Controller));
        assert!(lookup("nova-volume").is_none());
    }

    #[test]
    fn test_power_role_hosts_nothing() {
        assert_eq!(for_role(Role::Power).count(), 0);
        assert_eq!(for_role(Role::Controller).count(), 4);
    }
}
