// Tax module - lot matching, wash sales, year reports, reconciliation

pub mod lots;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod wash_sale;

pub use lots::{LotLedger, RealizationEvent};
pub use pipeline::{run_pipeline, PipelineRun};
pub use reconcile::{reconcile, ReconciliationReport};
pub use report::{build_tax_year_report, export_to_csv, open_lots_as_of, TaxYearReport};
pub use wash_sale::{apply_wash_sales, WashSalePass};
