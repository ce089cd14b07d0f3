//! Concrete tool wrappers that exercise the `ToolNode` contract end to end.

pub mod generic_template;
pub mod network_scan;

pub use generic_template::GenericTemplateParser;
pub use network_scan::NetworkScanParser;
