use crate::domain::account::Account;
use crate::error::{LedgerError, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct BalanceRow<'a> {
    user: &'a str,
    account: &'a str,
    balance: Decimal,
    frozen: bool,
}

/// Writes final account balances as CSV, one row per replayed alias.
pub struct BalanceWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> BalanceWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write(&mut self, user: &str, account: &Account) -> Result<()> {
        self.writer.serialize(BalanceRow {
            user,
            account: &account.number,
            balance: account.balance.value(),
            frozen: !account.is_active(),
        })?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        Ok(self.writer.flush()?)
    }

    /// Flushes and hands back the underlying sink.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| LedgerError::Storage(e.to_string()))
    }
}
