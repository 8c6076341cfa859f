//! Configuration-card emission for one candidate job.
//!
//! Two artifacts are written at configuration time: the scan-point table,
//! whose filename doubles as the job manifest the tracker discovers jobs by,
//! and the reweight card consumed by the external tool. Only the structure of
//! these files matters here; their physics content is opaque to the core.

use std::fmt::Write as _;
use std::path::Path;

use crate::error::Result;
use crate::plan::CandidateJob;

const COLUMN_WIDTH: usize = 15;

/// Scalar fed to the throwaway first reweight block.
const DUMMY_PROBE_VALUE: f64 = 0.0123;

/// Write the whitespace-column scan-point table: a header row of axis names,
/// an `MGStart` row with the anchor values, then one `rwgt{idx}` row per
/// sample in generation order. Axes absent from a point are written as 0.0.
pub fn save_scan_points(path: &Path, job: &CandidateJob) -> Result<()> {
    let mut table = String::new();
    let _ = write!(table, "{:<width$}", "", width = COLUMN_WIDTH);
    for dof in &job.dofs {
        let _ = write!(table, "{:<width$} ", dof.name(), width = COLUMN_WIDTH);
    }
    table.push('\n');

    push_row(&mut table, "MGStart", job, &job.start);
    for (idx, point) in job.points.iter().enumerate() {
        push_row(&mut table, &format!("rwgt{idx}"), job, point);
    }

    std::fs::write(path, table)?;
    Ok(())
}

fn push_row(table: &mut String, label: &str, job: &CandidateJob, point: &crate::scan::ScanPoint) {
    let _ = write!(table, "{:<width$}", label, width = COLUMN_WIDTH);
    for dof in &job.dofs {
        let _ = write!(
            table,
            "{:<width$} ",
            format_value(point.value_or_zero(dof.name())),
            width = COLUMN_WIDTH
        );
    }
    table.push('\n');
}

/// Write the reweight card: one `launch --rwgt_name=<label>` block per scan
/// point, each followed by `set <coefficient> <value>` lines obtained by
/// evaluating the owning axis at the point's scalar.
///
/// The first emitted block is always a throwaway launch with a harmless
/// label and a small probe value: the downstream tool mislabels the first
/// block, so a dummy must absorb that defect for the real points to keep
/// their names. Do not remove it.
pub fn write_reweight_card(path: &Path, job: &CandidateJob) -> Result<()> {
    // No points means nothing to reweight; write no file at all.
    if job.points.is_empty() {
        return Ok(());
    }

    let mut card = String::new();
    card.push_str("#******************************************************************\n");
    card.push_str("#                       Reweight Module                           *\n");
    card.push_str("#******************************************************************\n");
    card.push_str("\nchange rwgt_dir rwgt\n");

    card.push_str("\nlaunch --rwgt_name=dummy_point");
    if let Some(first) = job.dofs.first() {
        for (coeff, value) in first.eval(DUMMY_PROBE_VALUE) {
            let _ = write!(card, "\nset {coeff} {value:.6}");
        }
    }
    card.push('\n');

    for (idx, point) in job.points.iter().enumerate() {
        let mut label = format!("EFTrwgt{idx}");
        for (name, value) in point.iter() {
            let _ = write!(label, "_{}_{}", name, format_value(value));
        }
        let _ = write!(card, "\nlaunch --rwgt_name={label}");
        for (name, value) in point.iter() {
            match job.dofs.iter().find(|dof| dof.name() == name) {
                Some(dof) => {
                    for (coeff, scaled) in dof.eval(value) {
                        let _ = write!(card, "\nset {coeff} {scaled:.6}");
                    }
                }
                None => {
                    tracing::warn!(job = %job.key, coefficient = name, "Point names an undeclared axis, skipping");
                }
            }
        }
        card.push('\n');
    }

    std::fs::write(path, card)?;
    Ok(())
}

/// Write both configuration artifacts for a candidate. The manifest comes
/// last so a job only becomes discoverable once its card is in place; a
/// candidate with no points writes nothing and never becomes discoverable.
pub fn materialize(job: &CandidateJob, dir: &Path) -> Result<()> {
    if job.points.is_empty() {
        tracing::warn!(job = %job.key, "No scan points, skipping card emission");
        return Ok(());
    }
    write_reweight_card(&job.key.reweight_card(dir), job)?;
    save_scan_points(&job.key.manifest(dir), job)?;
    Ok(())
}

/// Plain decimal rendering with an explicit `.0` for integral values, so
/// anchor rows read as floats.
fn format_value(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}
