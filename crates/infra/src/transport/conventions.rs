//! Naming conventions for pipelines and endpoints.
//!
//! Conventions only produce names and definitions; creating anything is left
//! to the transport.

use serde::{Deserialize, Serialize};

use super::EndpointDefinition;

/// A bounded context inside a product namespace, e.g. `shop` / `billing`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundedContext {
    pub product_namespace: String,
    pub name: String,
}

impl BoundedContext {
    pub fn new(product_namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            product_namespace: product_namespace.into(),
            name: name.into(),
        }
    }
}

/// Which pipeline a bounded context uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineNameConvention {
    /// `{ns}.Commands`
    CommandPipelinePerApplication,
    /// `{ns}.Events`
    EventPipelinePerApplication,
    /// `{ns}.EventStore`
    EventStorePipelinePerApplication,
}

impl PipelineNameConvention {
    pub fn pipeline_name(self, context: &BoundedContext) -> String {
        let suffix = match self {
            PipelineNameConvention::CommandPipelinePerApplication => "Commands",
            PipelineNameConvention::EventPipelinePerApplication => "Events",
            PipelineNameConvention::EventStorePipelinePerApplication => "EventStore",
        };
        format!("{}.{suffix}", context.product_namespace)
    }
}

/// Builds endpoint definitions for a consumer.
pub trait EndpointNameConvention: Send + Sync {
    fn endpoint_definition(&self, context: &BoundedContext, handled_contracts: &[&str]) -> EndpointDefinition;
}

/// One endpoint per bounded context: `{ns}.{bc}.{suffix}`, accepting every
/// handled contract published under the context's namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPerBoundedContext {
    pipeline: PipelineNameConvention,
    suffix: String,
}

impl EndpointPerBoundedContext {
    pub fn new(pipeline: PipelineNameConvention, suffix: impl Into<String>) -> Self {
        Self {
            pipeline,
            suffix: suffix.into(),
        }
    }

    pub fn pipeline_convention(&self) -> PipelineNameConvention {
        self.pipeline
    }
}

impl EndpointNameConvention for EndpointPerBoundedContext {
    fn endpoint_definition(&self, context: &BoundedContext, handled_contracts: &[&str]) -> EndpointDefinition {
        let mut definition = EndpointDefinition::new(
            self.pipeline.pipeline_name(context),
            format!("{}.{}.{}", context.product_namespace, context.name, self.suffix),
        );
        for contract in handled_contracts {
            definition
                .routing_headers
                .insert(*contract, context.product_namespace.clone());
        }
        definition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_names_follow_namespace() {
        let context = BoundedContext::new("shop", "billing");
        assert_eq!(
            PipelineNameConvention::CommandPipelinePerApplication.pipeline_name(&context),
            "shop.Commands"
        );
        assert_eq!(
            PipelineNameConvention::EventPipelinePerApplication.pipeline_name(&context),
            "shop.Events"
        );
        assert_eq!(
            PipelineNameConvention::EventStorePipelinePerApplication.pipeline_name(&context),
            "shop.EventStore"
        );
    }

    #[test]
    fn endpoint_definition_routes_handled_contracts() {
        let context = BoundedContext::new("shop", "billing");
        let convention = EndpointPerBoundedContext::new(PipelineNameConvention::EventPipelinePerApplication, "Handlers");

        let definition =
            convention.endpoint_definition(&context, &["accounts.account.registered", "accounts.account.email_changed"]);

        assert_eq!(definition.pipeline_name, "shop.Events");
        assert_eq!(definition.endpoint_name, "shop.billing.Handlers");
        assert_eq!(definition.routing_headers.len(), 2);
        assert_eq!(definition.routing_headers.get("accounts.account.registered"), Some("shop"));
    }
}
