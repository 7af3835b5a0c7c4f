//! Node and cluster health diagnostics
//!
//! Facts neither progress source can report: what is actually happening
//! on the machines. One consolidated remote command per node per cycle,
//! parsed into findings, plus cluster-scoped checks once per cycle.

pub mod gather;
pub mod parser;
pub mod probe;
pub mod scheduler;

pub use gather::{run_gather, GatherOutcome};
pub use parser::{DiagnosticFinding, DiagnosticSeverity};
pub use probe::NodeDiagnosticProbe;
pub use scheduler::{DiagnosticScheduler, FindingsMap, NodeReport, CLUSTER_PSEUDO_NODE};
