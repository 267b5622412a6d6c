//! Document lifecycle and cross-file type resolution

pub mod cache;
pub mod config;
pub mod dependency;
pub mod document;
pub mod error;
pub mod graph;
pub mod lookup;
pub mod merger;
pub mod metrics;
pub mod scheduler;
pub mod session;
pub mod text_document;

pub use config::{Configuration, MergeStrategy, TypeAnalyzerConfig};
pub use dependency::{DependencyKind, DependencyLocation, ImportResolver};
pub use document::{ActiveDocument, DocumentEvent, DocumentManager, DEFAULT_LATEST_TIMEOUT};
pub use error::{ConfigurationError, DependencyLocationError};
pub use graph::{DocumentGraph, DocumentGraphBuilder, GraphEdge, GraphItem, GraphNode, NodeId};
pub use lookup::{LookupHelper, LookupResult};
pub use merger::{DependencyMerger, DocumentMergerCache, MergeContext, WorkspaceMerger};
pub use metrics::{AnalysisMetrics, AnalysisStats};
pub use scheduler::DocumentScheduler;
pub use session::Session;
pub use text_document::{position_to_offset, TextDocument};
