use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ScriptOp {
    Open,
    Deposit,
    Transfer,
    Freeze,
    Unfreeze,
}

/// One line of a settlement replay script.
///
/// `user` and `counterparty` are script-local aliases; the CLI resolves
/// them to ledger identities as it replays.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ScriptRow {
    pub op: ScriptOp,
    pub user: String,
    #[serde(default)]
    pub counterparty: Option<String>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Reads replay scripts from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record
/// lengths, yielding rows lazily so large scripts stream.
pub struct ScriptReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> ScriptReader<R> {
    /// Creates a reader over any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn rows(self) -> impl Iterator<Item = Result<ScriptRow>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LedgerError::from))
    }
}
