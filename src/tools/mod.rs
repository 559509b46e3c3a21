pub mod run_stats;
pub mod workbook;
