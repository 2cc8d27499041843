//! CSV report of one analysis.
//!
//! Layout, one record per line:
//!
//! ```text
//! Categoria,Parametro,Valore,Unita
//! Generale,Fornitore,<fornitore>,
//! Generale,Periodo,<periodo>,
//! KPI Unitario,Materia Prima,<v>,€/kWh|€/smc
//! KPI Unitario,Oneri Generali,<v>,€/kWh|€/smc
//! KPI Unitario,Spese Rete,<v>,€/kWh|€/smc
//! KPI Unitario,Quota Fissa,<v>,€/mese
//! Annuale,Consumo Totale,<v>,kWh|smc
//! Annuale,Spesa Stimata,<v>,€
//!
//! Storico Mese,Consumo Totale,F1,F2,F3
//! <mese>,<valore>,<f1>,<f2>,<f3>        (one per history month)
//! ```
//!
//! Bands the bill did not report are written as `0`.

use crate::error::BillError;
use crate::model::BillData;
use csv::{Terminator, Writer, WriterBuilder};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Header of the history section.
pub const HISTORY_HEADER: [&str; 5] = ["Storico Mese", "Consumo Totale", "F1", "F2", "F3"];

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Path separators and characters Windows refuses in file names.
static RE_UNSAFE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1F\x7F]"#).unwrap());

/// Suggested download name, e.g. `Analisi_Dettagliata_Enel_Energia.csv`.
///
/// The supplier is model output; it always ends up as a single path
/// component.
pub fn export_filename(bill: &BillData) -> String {
    let name = RE_WHITESPACE.replace_all(&bill.fornitore, "_");
    format!(
        "Analisi_Dettagliata_{}.csv",
        RE_UNSAFE_CHARS.replace_all(&name, "_")
    )
}

fn writer(buf: &mut Vec<u8>) -> Writer<&mut Vec<u8>> {
    WriterBuilder::new()
        .flexible(true)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(buf)
}

fn csv_err(e: impl std::fmt::Display) -> BillError {
    BillError::Internal(format!("CSV export: {e}"))
}

/// Render the report.
pub fn to_csv(bill: &BillData) -> Result<String, BillError> {
    let commodity = bill.commodity();
    let price_unit = commodity.price_unit();
    let mut buf = Vec::new();

    {
        let mut w = writer(&mut buf);
        let summary: [[String; 4]; 9] = [
            ["Categoria", "Parametro", "Valore", "Unita"].map(String::from),
            row("Generale", "Fornitore", bill.fornitore.clone(), ""),
            row("Generale", "Periodo", bill.periodo_fatturazione.clone(), ""),
            row("KPI Unitario", "Materia Prima", num(bill.prezzo_materia_prima_unitario), price_unit),
            row("KPI Unitario", "Oneri Generali", num(bill.oneri_generali_unitario), price_unit),
            row("KPI Unitario", "Spese Rete", num(bill.spese_rete_unitario), price_unit),
            row("KPI Unitario", "Quota Fissa", num(bill.quota_fissa_mensile), "€/mese"),
            row("Annuale", "Consumo Totale", num(bill.consumo_annuo_totale), commodity.unit()),
            row("Annuale", "Spesa Stimata", num(bill.spesa_totale_annua_stima), "€"),
        ];
        for record in &summary {
            w.write_record(record).map_err(csv_err)?;
        }
        w.flush().map_err(csv_err)?;
    }

    // Blank separator line between the two sections.
    buf.push(b'\n');

    {
        let mut w = writer(&mut buf);
        w.write_record(HISTORY_HEADER).map_err(csv_err)?;
        for item in &bill.storico_consumi {
            let bands = item.bands_or_zero();
            w.write_record([
                item.mese.clone(),
                num(item.valore),
                num(bands.f1),
                num(bands.f2),
                num(bands.f3),
            ])
            .map_err(csv_err)?;
        }
        w.flush().map_err(csv_err)?;
    }

    String::from_utf8(buf).map_err(csv_err)
}

/// Write the report into `dir` under [`export_filename`]; returns the path.
pub async fn write_csv(bill: &BillData, dir: &Path) -> Result<PathBuf, BillError> {
    let path = dir.join(export_filename(bill));
    write_csv_to(bill, &path).await?;
    Ok(path)
}

/// Write the report to an explicit path.
pub async fn write_csv_to(bill: &BillData, path: &Path) -> Result<(), BillError> {
    let content = to_csv(bill)?;
    tokio::fs::write(path, content)
        .await
        .map_err(|source| BillError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        })
}

fn row(category: &str, name: &str, value: String, unit: &str) -> [String; 4] {
    [category.to_string(), name.to_string(), value, unit.to_string()]
}

fn num(v: f64) -> String {
    v.to_string()
}
