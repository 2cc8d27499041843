//! The extraction instruction sent with every bill image.
//!
//! The prompt lists what to read off the bill; the shape of the answer is
//! fixed separately by [`crate::schema::BILL_SCHEMA`], so the text here never
//! needs to describe JSON. Callers can override it through
//! [`crate::config::GatewayConfig::prompt`].

/// Default six-step instruction for an Italian energy bill.
pub const EXTRACTION_PROMPT: &str = "Analizza questa bolletta energetica italiana.
1. Estrai i KPI unitari variabili (€/kWh o €/smc).
2. Estrai la Quota Fissa mensile.
3. IDENTIFICA lo STORICO CONSUMI: cerca il grafico o la tabella dei consumi mensili dell'ultimo anno.
4. Per ogni mese dello storico, estrai se possibile il dettaglio per FASCE (F1, F2, F3). Se vedi solo il totale, metti F1/F2/F3 a 0.
5. Normalizza tutti i dati su base annua (12 mesi).
6. Calcola la spesa annua totale stimata.";

/// Message shown to the end user for any failed analysis.
///
/// The underlying cause is logged, never displayed.
pub const USER_ERROR_MESSAGE: &str =
    "Errore durante l'analisi. Verifica che lo storico consumi e il dettaglio fasce siano leggibili.";
