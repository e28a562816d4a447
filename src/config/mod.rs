pub mod dashboard;

pub use dashboard::{
    AdminConfig, BackendConfig, ChatConfig, DashboardConfig, EnrichmentConfig, ModelEndpoints,
    ModelsConfig, ServerConfig, SourcesConfig,
};
