//! Tool catalogs
//!
//! A [`ToolCatalog`] lists every tool available to the pipeline. Each node
//! asks for the subset it declares with [`ToolCatalog::tools_for`].

use crate::client::McpHttpClient;
use crate::config::TransportConfig;
use crate::tool::McpTool;
use crate::Result;
use analyst_core::{Tool, select_tools};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

/// Source of remote tools
#[async_trait]
pub trait ToolCatalog: Send + Sync {
    /// Every tool the service offers
    async fn list_tools(&self) -> Result<Vec<Arc<dyn Tool>>>;

    /// Tools whose names appear in `names`
    ///
    /// An empty declaration never contacts the service.
    async fn tools_for(&self, names: &[&str]) -> Result<Vec<Arc<dyn Tool>>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        Ok(select_tools(&self.list_tools().await?, names))
    }
}

/// Catalog backed by the remote tool service
///
/// The tool list is fetched on first use and shared by every node of the
/// run. A failed fetch is not cached.
pub struct McpToolCatalog {
    client: Arc<McpHttpClient>,
    tools: OnceCell<Vec<Arc<dyn Tool>>>,
}

impl McpToolCatalog {
    pub fn new(transport: TransportConfig) -> Result<Self> {
        Ok(Self::with_client(Arc::new(McpHttpClient::new(transport)?)))
    }

    pub fn with_client(client: Arc<McpHttpClient>) -> Self {
        Self {
            client,
            tools: OnceCell::new(),
        }
    }

    async fn fetch(&self) -> Result<Vec<Arc<dyn Tool>>> {
        let definitions = self.client.list_tools().await?;
        info!(
            transport = self.client.transport().kind(),
            count = definitions.len(),
            "Discovered remote tools"
        );
        Ok(definitions
            .into_iter()
            .map(|definition| {
                Arc::new(McpTool::new(definition, Arc::clone(&self.client))) as Arc<dyn Tool>
            })
            .collect())
    }
}

#[async_trait]
impl ToolCatalog for McpToolCatalog {
    async fn list_tools(&self) -> Result<Vec<Arc<dyn Tool>>> {
        self.tools.get_or_try_init(|| self.fetch()).await.cloned()
    }
}

/// Catalog over a fixed set of tools
#[derive(Default, Clone)]
pub struct StaticToolCatalog {
    tools: Vec<Arc<dyn Tool>>,
}

impl StaticToolCatalog {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl ToolCatalog for StaticToolCatalog {
    async fn list_tools(&self) -> Result<Vec<Arc<dyn Tool>>> {
        Ok(self.tools.clone())
    }
}
