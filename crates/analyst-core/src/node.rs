//! Node catalogue
//!
//! The set of nodes is closed: five selectable analysts that run concurrently,
//! plus the risk manager and portfolio manager that always run, in that order,
//! after every analyst has finished. Each node owns exactly one output field
//! of the [`ResultRecord`](crate::ResultRecord).

use crate::error::ConfigError;
use crate::record::OutputField;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a pipeline node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    /// News sentiment analyst
    News,
    /// Price trend and indicator analyst
    Technical,
    /// Financial statement and macro analyst
    Fundamentals,
    /// Revenue and profit growth analyst
    Growth,
    /// Relative and absolute valuation analyst
    Valuation,
    /// Risk manager, runs once after all analysts
    Risk,
    /// Portfolio manager, produces the final recommendation
    Portfolio,
}

impl NodeId {
    /// Every node, in catalogue order
    pub const ALL: [NodeId; 7] = [
        NodeId::News,
        NodeId::Technical,
        NodeId::Fundamentals,
        NodeId::Growth,
        NodeId::Valuation,
        NodeId::Risk,
        NodeId::Portfolio,
    ];

    /// The selectable analyst nodes (the candidate set)
    pub const CANDIDATES: [NodeId; 5] = [
        NodeId::News,
        NodeId::Technical,
        NodeId::Fundamentals,
        NodeId::Growth,
        NodeId::Valuation,
    ];

    /// Short identifier used in configuration (e.g. `news`)
    pub fn short_name(self) -> &'static str {
        match self {
            NodeId::News => "news",
            NodeId::Technical => "technical",
            NodeId::Fundamentals => "fundamentals",
            NodeId::Growth => "growth",
            NodeId::Valuation => "valuation",
            NodeId::Risk => "risk",
            NodeId::Portfolio => "portfolio",
        }
    }

    /// Graph node name (e.g. `news_analyst`)
    pub fn name(self) -> &'static str {
        match self {
            NodeId::News => "news_analyst",
            NodeId::Technical => "technical_analyst",
            NodeId::Fundamentals => "fundamentals_analyst",
            NodeId::Growth => "growth_analyst",
            NodeId::Valuation => "valuation_analyst",
            NodeId::Risk => "risk_manager",
            NodeId::Portfolio => "portfolio_manager",
        }
    }

    /// Static descriptor for this node
    pub fn descriptor(self) -> &'static NodeDescriptor {
        &DESCRIPTORS[self as usize]
    }

    /// Output field owned by this node
    pub fn field(self) -> OutputField {
        self.descriptor().field
    }

    /// Stage this node belongs to
    pub fn stage(self) -> Stage {
        self.descriptor().stage
    }

    /// Whether the node may appear in an analyst selection
    pub fn is_selectable(self) -> bool {
        self.stage() == Stage::FanOut
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NodeId {
    type Err = ConfigError;

    /// Accepts either the short identifier or the node name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        NodeId::ALL
            .into_iter()
            .find(|id| id.short_name() == needle || id.name() == needle)
            .ok_or_else(|| ConfigError::UnknownNode(s.to_string()))
    }
}

/// Position of a node in the fixed pipeline shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Runs concurrently with the other selected analysts
    FanOut,
    /// Runs once after the barrier
    BarrierSuccessor,
    /// Runs last
    Terminal,
}

/// Model role a node's runner is configured with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    /// General purpose chat model
    #[default]
    Basic,
    /// Slower model with stronger reasoning
    Reasoning,
    /// Model with image input
    Vision,
}

impl ModelRole {
    /// Configuration key for this role
    pub fn as_str(self) -> &'static str {
        match self {
            ModelRole::Basic => "basic",
            ModelRole::Reasoning => "reasoning",
            ModelRole::Vision => "vision",
        }
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External capability a node needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    /// Model role used by the node's runner
    pub role: ModelRole,
    /// Exact names of the remote tools the node may call
    pub tools: &'static [&'static str],
}

/// Static metadata for one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub id: NodeId,
    pub field: OutputField,
    pub stage: Stage,
    pub capability: Capability,
}

// Indexed by `NodeId as usize`; order must follow the enum declaration.
static DESCRIPTORS: [NodeDescriptor; 7] = [
    NodeDescriptor {
        id: NodeId::News,
        field: OutputField::NewsAnalysis,
        stage: Stage::FanOut,
        capability: Capability {
            role: ModelRole::Basic,
            tools: &["finance_news"],
        },
    },
    NodeDescriptor {
        id: NodeId::Technical,
        field: OutputField::TechnicalAnalysis,
        stage: Stage::FanOut,
        capability: Capability {
            role: ModelRole::Basic,
            tools: &[
                "stock_data",
                "stock_data_minutes",
                "index_data",
                "money_flow",
                "csi_index_constituents",
            ],
        },
    },
    NodeDescriptor {
        id: NodeId::Fundamentals,
        field: OutputField::FundamentalsAnalysis,
        stage: Stage::FanOut,
        capability: Capability {
            role: ModelRole::Basic,
            tools: &["company_performance", "macro_econ"],
        },
    },
    NodeDescriptor {
        id: NodeId::Growth,
        field: OutputField::GrowthAnalysis,
        stage: Stage::FanOut,
        capability: Capability {
            role: ModelRole::Basic,
            tools: &[
                "company_performance",
                "fund_data",
                "company_performance_hk",
                "company_performance_us",
            ],
        },
    },
    NodeDescriptor {
        id: NodeId::Valuation,
        field: OutputField::ValuationAnalysis,
        stage: Stage::FanOut,
        capability: Capability {
            role: ModelRole::Basic,
            tools: &[
                "company_performance",
                "stock_data",
                "index_data",
                "csi_index_constituents",
            ],
        },
    },
    NodeDescriptor {
        id: NodeId::Risk,
        field: OutputField::RiskAnalysis,
        stage: Stage::BarrierSuccessor,
        capability: Capability {
            role: ModelRole::Basic,
            tools: &["block_trade", "company_performance", "convertible_bond"],
        },
    },
    NodeDescriptor {
        id: NodeId::Portfolio,
        field: OutputField::PortfolioRecommendation,
        stage: Stage::Terminal,
        capability: Capability {
            role: ModelRole::Basic,
            tools: &[],
        },
    },
];

/// Ordered, duplicate-free set of selected analyst descriptors
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActiveSet {
    nodes: Vec<&'static NodeDescriptor>,
}

impl ActiveSet {
    /// The full candidate set in catalogue order
    pub fn all() -> Self {
        Self {
            nodes: NodeId::CANDIDATES
                .into_iter()
                .map(NodeId::descriptor)
                .collect(),
        }
    }

    /// Selected node identifiers, in selection order
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(|d| d.id)
    }

    /// Selected descriptors, in selection order
    pub fn descriptors(&self) -> &[&'static NodeDescriptor] {
        &self.nodes
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.iter().any(|d| d.id == id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Resolve an analyst selection into descriptors
///
/// `None` selects the full candidate set. `Some(&[])` is a legal empty
/// selection: no analysts run and the barrier passes straight through.
///
/// # Examples
///
/// ```
/// use analyst_core::{resolve, NodeId};
///
/// let active = resolve(Some(["technical", "news_analyst"].as_slice())).unwrap();
/// assert_eq!(active.ids().collect::<Vec<_>>(), vec![NodeId::Technical, NodeId::News]);
///
/// assert_eq!(resolve::<&str>(None).unwrap().len(), 5);
/// assert!(resolve(Some(["unknown"].as_slice())).is_err());
/// ```
pub fn resolve<S: AsRef<str>>(names: Option<&[S]>) -> Result<ActiveSet, ConfigError> {
    let Some(names) = names else {
        return Ok(ActiveSet::all());
    };

    let mut nodes: Vec<&'static NodeDescriptor> = Vec::with_capacity(names.len());
    for name in names {
        let id: NodeId = name.as_ref().parse()?;
        if !id.is_selectable() {
            return Err(ConfigError::NotSelectable(name.as_ref().to_string()));
        }
        if nodes.iter().any(|d| d.id == id) {
            return Err(ConfigError::DuplicateNode(name.as_ref().to_string()));
        }
        nodes.push(id.descriptor());
    }

    Ok(ActiveSet { nodes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_table_matches_enum() {
        for id in NodeId::ALL {
            assert_eq!(id.descriptor().id, id);
        }
    }

    #[test]
    fn test_fields_are_distinct() {
        let mut fields: Vec<_> = NodeId::ALL.iter().map(|id| id.field()).collect();
        fields.sort_by_key(|f| f.key());
        fields.dedup();
        assert_eq!(fields.len(), NodeId::ALL.len());
    }

    #[test]
    fn test_stages() {
        for id in NodeId::CANDIDATES {
            assert_eq!(id.stage(), Stage::FanOut);
        }
        assert_eq!(NodeId::Risk.stage(), Stage::BarrierSuccessor);
        assert_eq!(NodeId::Portfolio.stage(), Stage::Terminal);
    }

    #[test]
    fn test_parse_both_forms() {
        assert_eq!("growth".parse::<NodeId>().unwrap(), NodeId::Growth);
        assert_eq!("growth_analyst".parse::<NodeId>().unwrap(), NodeId::Growth);
        assert_eq!("risk_manager".parse::<NodeId>().unwrap(), NodeId::Risk);
        assert!("Growth".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_resolve_none_is_full_set() {
        let active = resolve::<&str>(None).unwrap();
        assert_eq!(active.ids().collect::<Vec<_>>(), NodeId::CANDIDATES.to_vec());
    }

    #[test]
    fn test_resolve_empty_is_empty() {
        let empty: [&str; 0] = [];
        let active = resolve(Some(empty.as_slice())).unwrap();
        assert!(active.is_empty());
    }

    #[test]
    fn test_resolve_keeps_order() {
        let active = resolve(Some(["valuation", "news", "growth"].as_slice())).unwrap();
        assert_eq!(
            active.ids().collect::<Vec<_>>(),
            vec![NodeId::Valuation, NodeId::News, NodeId::Growth]
        );
    }

    #[test]
    fn test_resolve_unknown() {
        assert_eq!(
            resolve(Some(["unknown"].as_slice())),
            Err(ConfigError::UnknownNode("unknown".to_string()))
        );
    }

    #[test]
    fn test_resolve_duplicate() {
        assert_eq!(
            resolve(Some(["news", "technical", "news_analyst"].as_slice())),
            Err(ConfigError::DuplicateNode("news_analyst".to_string()))
        );
    }

    #[test]
    fn test_resolve_tail_nodes_not_selectable() {
        assert_eq!(
            resolve(Some(["risk"].as_slice())),
            Err(ConfigError::NotSelectable("risk".to_string()))
        );
        assert!(matches!(
            resolve(Some(["portfolio_manager"].as_slice())),
            Err(ConfigError::NotSelectable(_))
        ));
    }

    #[test]
    fn test_capability_tools() {
        let technical = NodeId::Technical.descriptor();
        assert!(technical.capability.tools.contains(&"money_flow"));
        assert!(NodeId::Portfolio.descriptor().capability.tools.is_empty());
        assert_eq!(NodeId::Risk.descriptor().capability.role, ModelRole::Basic);
    }
}
