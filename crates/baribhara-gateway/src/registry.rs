//! Service registry.
//!
//! Maps logical service names to backend addresses. Built once at startup
//! from the `services` config section and shared read-only.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::ServiceSettings;

/// Network location of one backend service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceEndpoint {
    /// Host name or IP.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl ServiceEndpoint {
    /// Creates an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port`, as sent in the `Host` header.
    #[must_use]
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `http://host:port`.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.authority())
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl From<&ServiceSettings> for ServiceEndpoint {
    fn from(settings: &ServiceSettings) -> Self {
        Self::new(settings.host.clone(), settings.port)
    }
}

/// Logical service name → endpoint.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    endpoints: BTreeMap<String, ServiceEndpoint>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry from the `services` config section.
    pub fn from_config<'a, I>(services: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a ServiceSettings)>,
    {
        let mut registry = Self::new();
        for (name, settings) in services {
            registry.register(name.clone(), ServiceEndpoint::from(settings));
        }
        registry
    }

    /// Registers or replaces a service.
    pub fn register(&mut self, name: impl Into<String>, endpoint: ServiceEndpoint) {
        self.endpoints.insert(name.into(), endpoint);
    }

    /// Looks up a service.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&ServiceEndpoint> {
        self.endpoints.get(name)
    }

    /// Returns true if the service is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.endpoints.contains_key(name)
    }

    /// Registered service names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Returns true if no service is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_services;

    #[test]
    fn test_from_default_config() {
        let registry = ServiceRegistry::from_config(&default_services());
        assert_eq!(registry.len(), 9);

        let users = registry.resolve("user-service").unwrap();
        assert_eq!(users.authority(), "localhost:3002");
        assert_eq!(users.base_url(), "http://localhost:3002");
        assert!(registry.resolve("billing-service").is_none());
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ServiceRegistry::new();
        assert!(registry.is_empty());

        registry.register("auth-service", ServiceEndpoint::new("a", 1));
        registry.register("auth-service", ServiceEndpoint::new("b", 2));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("auth-service").unwrap().to_string(), "b:2");
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["auth-service"]);
        assert!(registry.contains("auth-service"));
    }
}
