//! The output schema handed to the provider.
//!
//! The schema is a typed value built once ([`BILL_SCHEMA`]) rather than a JSON
//! literal re-assembled on every call. It serializes to the provider's
//! `responseSchema` dialect (`"type": "OBJECT"`, `properties`, `required`,
//! `items`, plus `propertyOrdering` so fields come back in the order below).
//!
//! [`verify_against_bill_data`] compares the schema with the serialized shape
//! of [`BillData`]; the gateway runs it before it starts listening, so a field
//! renamed on one side but not the other stops the process instead of
//! silently producing defaults.

use crate::error::BillError;
use crate::model::{BillData, ConsumptionByBand, HistoryItem};
use once_cell::sync::Lazy;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;

/// Primitive kinds understood by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SchemaType {
    Object,
    Array,
    String,
    Number,
    Boolean,
}

/// One node of the output schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub kind: SchemaType,
    pub description: Option<&'static str>,
    /// Object properties, in the order the model should emit them.
    pub properties: Vec<(&'static str, Schema)>,
    /// Element schema for arrays.
    pub items: Option<Box<Schema>>,
    pub required: Vec<&'static str>,
}

impl Schema {
    fn leaf(kind: SchemaType) -> Self {
        Self {
            kind,
            description: None,
            properties: Vec::new(),
            items: None,
            required: Vec::new(),
        }
    }

    pub fn string() -> Self {
        Self::leaf(SchemaType::String)
    }

    pub fn number() -> Self {
        Self::leaf(SchemaType::Number)
    }

    pub fn boolean() -> Self {
        Self::leaf(SchemaType::Boolean)
    }

    pub fn array(items: Schema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::leaf(SchemaType::Array)
        }
    }

    pub fn object(properties: Vec<(&'static str, Schema)>) -> Self {
        Self {
            properties,
            ..Self::leaf(SchemaType::Object)
        }
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }

    pub fn require(mut self, fields: &[&'static str]) -> Self {
        self.required = fields.to_vec();
        self
    }

    /// Look up a direct property by name.
    pub fn property(&self, name: &str) -> Option<&Schema> {
        self.properties
            .iter()
            .find_map(|(k, s)| (*k == name).then_some(s))
    }
}

impl Serialize for Schema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", &self.kind)?;
        if let Some(description) = self.description {
            map.serialize_entry("description", description)?;
        }
        if !self.properties.is_empty() {
            map.serialize_entry("properties", &Properties(&self.properties))?;
            let ordering: Vec<&str> = self.properties.iter().map(|(k, _)| *k).collect();
            map.serialize_entry("propertyOrdering", &ordering)?;
        }
        if let Some(ref items) = self.items {
            map.serialize_entry("items", items)?;
        }
        if !self.required.is_empty() {
            map.serialize_entry("required", &self.required)?;
        }
        map.end()
    }
}

struct Properties<'a>(&'a [(&'static str, Schema)]);

impl Serialize for Properties<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, schema) in self.0 {
            map.serialize_entry(name, schema)?;
        }
        map.end()
    }
}

/// The bill extraction schema, built on first use.
pub static BILL_SCHEMA: Lazy<Schema> = Lazy::new(bill_schema);

fn bill_schema() -> Schema {
    let bands = Schema::object(vec![
        ("f1", Schema::number()),
        ("f2", Schema::number()),
        ("f3", Schema::number()),
    ])
    .require(&["f1", "f2", "f3"]);

    let history_item = Schema::object(vec![
        ("mese", Schema::string().describe("Mese e anno, es: Gen 24")),
        ("valore", Schema::number().describe("Valore totale consumato nel mese")),
        (
            "f1",
            Schema::number().describe("Consumo in fascia F1 (se disponibile, altrimenti 0)"),
        ),
        (
            "f2",
            Schema::number().describe("Consumo in fascia F2 (se disponibile, altrimenti 0)"),
        ),
        (
            "f3",
            Schema::number().describe("Consumo in fascia F3 (se disponibile, altrimenti 0)"),
        ),
    ])
    .require(&["mese", "valore"]);

    Schema::object(vec![
        ("fornitore", Schema::string().describe("Nome del fornitore")),
        (
            "periodo_fatturazione",
            Schema::string().describe("Esempio: Gen-Feb 2024"),
        ),
        ("is_gas", Schema::boolean().describe("True se GAS, False se LUCE")),
        ("giorni_periodo", Schema::number().describe("Giorni coperti dalla bolletta")),
        (
            "prezzo_materia_prima_unitario",
            Schema::number().describe("€/kWh o €/smc"),
        ),
        ("quota_fissa_mensile", Schema::number().describe("€/mese")),
        ("quota_potenza_mensile", Schema::number().describe("€/kW/mese")),
        (
            "oneri_generali_unitario",
            Schema::number().describe("Quota variabile oneri (€/kWh o €/smc)"),
        ),
        (
            "spese_rete_unitario",
            Schema::number().describe("Quota variabile rete (€/kWh o €/smc)"),
        ),
        (
            "prezzo_energia_unitario",
            Schema::number().describe("Somma componenti variabili"),
        ),
        ("potenza_impegnata", Schema::number().describe("kW")),
        (
            "consumo_annuo_totale",
            Schema::number().describe("Consumo annuo 12 mesi"),
        ),
        ("consumo_annuo_fasce", bands),
        ("quota_fissa_annua", Schema::number()),
        ("oneri_generali_annui", Schema::number()),
        ("spese_rete_annui", Schema::number()),
        (
            "storico_consumi",
            Schema::array(history_item)
                .describe("Andamento storico consumi ultimi 12 mesi con dettaglio fasce F1/F2/F3"),
        ),
        ("spesa_totale_annua_stima", Schema::number()),
        ("spesa_bolletta_attuale", Schema::number()),
    ])
    .require(&[
        "fornitore",
        "is_gas",
        "storico_consumi",
        "spesa_totale_annua_stima",
    ])
}

/// Check that `schema` describes exactly the fields [`BillData`] serializes.
pub fn verify_against_bill_data(schema: &Schema) -> Result<(), BillError> {
    let sample = BillData {
        consumo_annuo_fasce: ConsumptionByBand::default(),
        storico_consumi: vec![HistoryItem {
            f1: Some(0.0),
            f2: Some(0.0),
            f3: Some(0.0),
            ..HistoryItem::default()
        }],
        ..BillData::default()
    };
    let value = serde_json::to_value(&sample).map_err(|e| BillError::Internal(e.to_string()))?;
    check_node(schema, &value, "$")
}

fn check_node(schema: &Schema, value: &Value, path: &str) -> Result<(), BillError> {
    let mismatch = |what: String| Err(BillError::SchemaMismatch(format!("{path}: {what}")));

    match (schema.kind, value) {
        (SchemaType::String, Value::String(_))
        | (SchemaType::Number, Value::Number(_))
        | (SchemaType::Boolean, Value::Bool(_)) => Ok(()),
        (SchemaType::Array, Value::Array(elems)) => match (&schema.items, elems.first()) {
            (Some(items), Some(first)) => check_node(items, first, &format!("{path}[]")),
            (None, _) => mismatch("array schema without items".into()),
            (Some(_), None) => Ok(()),
        },
        (SchemaType::Object, Value::Object(fields)) => {
            for (name, sub) in &schema.properties {
                match fields.get(*name) {
                    Some(v) => check_node(sub, v, &format!("{path}.{name}"))?,
                    None => return mismatch(format!("schema property '{name}' is not a BillData field")),
                }
            }
            if let Some(extra) = fields.keys().find(|k| schema.property(k).is_none()) {
                return mismatch(format!("field '{extra}' is missing from the schema"));
            }
            if let Some(req) = schema
                .required
                .iter()
                .find(|r| schema.property(r).is_none())
            {
                return mismatch(format!("required '{req}' is not a property"));
            }
            Ok(())
        }
        (kind, v) => mismatch(format!("schema says {kind:?}, type serializes {v}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bill_schema_matches_bill_data() {
        verify_against_bill_data(&BILL_SCHEMA).expect("schema in sync");
    }

    #[test]
    fn top_level_required_fields() {
        assert_eq!(
            BILL_SCHEMA.required,
            vec!["fornitore", "is_gas", "storico_consumi", "spesa_totale_annua_stima"]
        );
    }

    #[test]
    fn nested_required_fields() {
        let bands = BILL_SCHEMA.property("consumo_annuo_fasce").unwrap();
        assert_eq!(bands.required, vec!["f1", "f2", "f3"]);

        let history = BILL_SCHEMA.property("storico_consumi").unwrap();
        let item = history.items.as_deref().unwrap();
        assert_eq!(item.required, vec!["mese", "valore"]);
    }

    #[test]
    fn serializes_in_provider_dialect() {
        let v = serde_json::to_value(&*BILL_SCHEMA).unwrap();
        assert_eq!(v["type"], "OBJECT");
        assert_eq!(v["properties"]["is_gas"]["type"], "BOOLEAN");
        assert_eq!(v["properties"]["storico_consumi"]["type"], "ARRAY");
        assert_eq!(v["properties"]["storico_consumi"]["items"]["type"], "OBJECT");
        assert_eq!(v["propertyOrdering"][0], "fornitore");
        // leaves carry no empty collections
        assert!(v["properties"]["quota_fissa_annua"].get("required").is_none());
    }

    #[test]
    fn renamed_property_is_detected() {
        let mut schema = BILL_SCHEMA.clone();
        schema.properties[0].0 = "supplier";
        let err = verify_against_bill_data(&schema).unwrap_err();
        assert!(matches!(err, BillError::SchemaMismatch(_)));
    }

    #[test]
    fn wrong_leaf_type_is_detected() {
        let mut schema = BILL_SCHEMA.clone();
        let pos = schema
            .properties
            .iter()
            .position(|(k, _)| *k == "is_gas")
            .unwrap();
        schema.properties[pos].1 = Schema::string();
        assert!(verify_against_bill_data(&schema).is_err());
    }
}
