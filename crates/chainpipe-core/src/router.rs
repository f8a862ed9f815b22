//! Topic routing: maps a message type name to its broker topic.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::RoutingError;
use crate::types::trim_type_name;

/// One routing entry: every type in `types` is published to topic `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRoute {
    pub name: String,
    pub types: Vec<String>,
}

/// Exact-match routing table from type name to topic.
#[derive(Debug, Clone, Default)]
pub struct TopicRouter {
    mapping: HashMap<String, String>,
}

impl TopicRouter {
    pub fn new(mapping: HashMap<String, String>) -> Self {
        let mapping = mapping
            .into_iter()
            .map(|(ty, topic)| (trim_type_name(&ty).to_string(), topic))
            .collect();
        Self { mapping }
    }

    /// Flatten a list of routes. A type listed under several topics keeps the last one.
    pub fn from_routes(routes: &[TopicRoute]) -> Self {
        let mut mapping = HashMap::new();
        for route in routes {
            for ty in &route.types {
                mapping.insert(trim_type_name(ty).to_string(), route.name.clone());
            }
        }
        Self { mapping }
    }

    /// Resolve the topic for `type_name` (leading `/` ignored).
    pub fn resolve_topic(&self, type_name: &str) -> Result<&str, RoutingError> {
        self.mapping
            .get(trim_type_name(type_name))
            .map(String::as_str)
            .ok_or_else(|| {
                tracing::warn!(type_name, "unknown message type");
                RoutingError::UnknownType {
                    type_name: type_name.to_string(),
                }
            })
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}
