use anyhow::Result;

use crate::model::VulnerabilityReport;

pub fn print_json(report: &VulnerabilityReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    println!("{}", json);
    Ok(())
}
