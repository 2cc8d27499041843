//! The structured extraction result.
//!
//! Field names are the Italian keys the model is asked to produce, so the
//! provider's JSON deserializes straight into [`BillData`] and the gateway can
//! hand the very same JSON back to its callers.
//!
//! Only the four top-level fields the schema marks as required are required
//! here; every other number defaults to `0` and every other string to empty,
//! which is what the model omits when the bill does not show a figure. An
//! explicit `null` in one of those optional fields reads as the default too.

use crate::error::BillError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Figures extracted from one bill, normalised to a 12-month basis.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BillData {
    // ── Identity ─────────────────────────────────────────────────────────
    pub fornitore: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub periodo_fatturazione: String,
    pub is_gas: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub giorni_periodo: f64,

    // ── Unit rates ───────────────────────────────────────────────────────
    /// Raw energy price, €/kWh or €/smc.
    #[serde(default, deserialize_with = "null_as_default")]
    pub prezzo_materia_prima_unitario: f64,
    /// €/month.
    #[serde(default, deserialize_with = "null_as_default")]
    pub quota_fissa_mensile: f64,
    /// €/kW/month.
    #[serde(default, deserialize_with = "null_as_default")]
    pub quota_potenza_mensile: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub oneri_generali_unitario: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub spese_rete_unitario: f64,
    /// Sum of the variable components.
    #[serde(default, deserialize_with = "null_as_default")]
    pub prezzo_energia_unitario: f64,
    /// kW.
    #[serde(default, deserialize_with = "null_as_default")]
    pub potenza_impegnata: f64,

    // ── Annualised ───────────────────────────────────────────────────────
    #[serde(default, deserialize_with = "null_as_default")]
    pub consumo_annuo_totale: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub consumo_annuo_fasce: ConsumptionByBand,
    #[serde(default, deserialize_with = "null_as_default")]
    pub quota_fissa_annua: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub oneri_generali_annui: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub spese_rete_annui: f64,

    // ── History ──────────────────────────────────────────────────────────
    pub storico_consumi: Vec<HistoryItem>,

    pub spesa_totale_annua_stima: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub spesa_bolletta_attuale: f64,
}

/// Time-of-use consumption split: peak, intermediate, off-peak.
///
/// All three zero usually means "not reported", not a true zero reading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConsumptionByBand {
    pub f1: f64,
    pub f2: f64,
    pub f3: f64,
}

/// One calendar month of the consumption history printed on the bill.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HistoryItem {
    /// Free-text month label as printed, e.g. "Gen 24".
    pub mese: String,
    /// Total consumption in the month.
    pub valore: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f3: Option<f64>,
}

impl HistoryItem {
    /// Band values with absent bands read as `0`.
    pub fn bands_or_zero(&self) -> ConsumptionByBand {
        ConsumptionByBand {
            f1: self.f1.unwrap_or(0.0),
            f2: self.f2.unwrap_or(0.0),
            f3: self.f3.unwrap_or(0.0),
        }
    }
}

/// Which commodity the bill is for; selects every unit label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commodity {
    Electricity,
    Gas,
}

impl Commodity {
    /// Consumption unit: `kWh` or `smc`.
    pub fn unit(self) -> &'static str {
        match self {
            Commodity::Electricity => "kWh",
            Commodity::Gas => "smc",
        }
    }

    /// Unit-price label: `€/kWh` or `€/smc`.
    pub fn price_unit(self) -> &'static str {
        match self {
            Commodity::Electricity => "€/kWh",
            Commodity::Gas => "€/smc",
        }
    }
}

impl fmt::Display for Commodity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Commodity::Electricity => f.write_str("luce"),
            Commodity::Gas => f.write_str("gas"),
        }
    }
}

impl BillData {
    pub fn commodity(&self) -> Commodity {
        if self.is_gas {
            Commodity::Gas
        } else {
            Commodity::Electricity
        }
    }

    /// Deserialize and validate a provider JSON value.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, BillError> {
        let bill = Self::deserialize(value).map_err(|e| BillError::InvalidExtraction {
            detail: e.to_string(),
        })?;
        bill.validate()?;
        Ok(bill)
    }

    /// Check the invariants a successful extraction must satisfy.
    pub fn validate(&self) -> Result<(), BillError> {
        if self.storico_consumi.is_empty() {
            return Err(invalid("storico_consumi is empty"));
        }

        for (i, item) in self.storico_consumi.iter().enumerate() {
            if !item.valore.is_finite() || item.valore < 0.0 {
                return Err(invalid(format!(
                    "storico_consumi[{i}] ({}) has invalid valore {}",
                    item.mese, item.valore
                )));
            }
        }

        let scalars = [
            ("giorni_periodo", self.giorni_periodo),
            ("prezzo_materia_prima_unitario", self.prezzo_materia_prima_unitario),
            ("quota_fissa_mensile", self.quota_fissa_mensile),
            ("quota_potenza_mensile", self.quota_potenza_mensile),
            ("oneri_generali_unitario", self.oneri_generali_unitario),
            ("spese_rete_unitario", self.spese_rete_unitario),
            ("prezzo_energia_unitario", self.prezzo_energia_unitario),
            ("potenza_impegnata", self.potenza_impegnata),
            ("consumo_annuo_totale", self.consumo_annuo_totale),
            ("quota_fissa_annua", self.quota_fissa_annua),
            ("oneri_generali_annui", self.oneri_generali_annui),
            ("spese_rete_annui", self.spese_rete_annui),
            ("spesa_totale_annua_stima", self.spesa_totale_annua_stima),
            ("spesa_bolletta_attuale", self.spesa_bolletta_attuale),
        ];
        if let Some((name, v)) = scalars.iter().find(|(_, v)| !v.is_finite()) {
            return Err(invalid(format!("{name} is not a finite number ({v})")));
        }

        Ok(())
    }
}

/// `null` deserializes to `T::default()`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn invalid(detail: impl Into<String>) -> BillError {
    BillError::InvalidExtraction {
        detail: detail.into(),
    }
}
