use anyhow::Result;
use tabled::{settings::Style, Table, Tabled};

use crate::model::{Package, VulnerabilityReport};

#[derive(Tabled)]
struct FindingRow {
    #[tabled(rename = "Feed")]
    feed: String,
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "CVE")]
    cve: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Vulnerable")]
    vulnerable: String,
    #[tabled(rename = "Fixed In")]
    fixed_in: String,
}

#[derive(Tabled)]
struct PackageRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Version")]
    version: String,
}

pub fn print_report_table(report: &VulnerabilityReport) -> Result<()> {
    println!();
    println!(
        "Scan completed at: {}",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();

    if report.is_clean() {
        println!("No known vulnerabilities found.");
        return Ok(());
    }

    println!("Found {} vulnerabilities:", report.total());
    println!();

    let rows: Vec<FindingRow> = report
        .findings
        .iter()
        .flat_map(|(feed, findings)| {
            findings.iter().map(move |v| FindingRow {
                feed: feed.clone(),
                package: v.package.clone(),
                version: v.package_version.clone(),
                cve: dash_when_empty(&v.cve),
                title: truncate(&v.title, 50),
                vulnerable: dash_when_empty(&v.vulnerable_range),
                fixed_in: dash_when_empty(&v.fixed_range),
            })
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
    Ok(())
}

pub fn print_packages_table(packages: &[Package]) -> Result<()> {
    if packages.is_empty() {
        println!("No packages found.");
        return Ok(());
    }

    println!("Found {} packages:", packages.len());
    println!();

    let rows: Vec<PackageRow> = packages
        .iter()
        .map(|p| PackageRow {
            name: truncate(&p.name, 40),
            version: p.version.clone(),
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
    Ok(())
}

fn dash_when_empty(text: &str) -> String {
    if text.is_empty() {
        "-".to_string()
    } else {
        text.to_string()
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
