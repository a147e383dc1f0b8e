use std::collections::BTreeMap;
use std::sync::Arc;

use relic_mi::Value;

use crate::error::{CommandError, Result};
use crate::session::MiSession;
use crate::sync::lock;

const PROGRAM_COUNTER_NAMES: &[&str] = &["pc", "iar", "nip"];

/// Register values of the target at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterSnapshot {
    /// Every named register with its value, in register number order.
    pub general: Vec<(String, String)>,

    /// Program counter value.
    pub program_counter: Option<String>,

    /// Link register value.
    pub link_register: Option<String>,

    /// Counter register value.
    pub counter_register: Option<String>,
}

impl RegisterSnapshot {
    /// Returns the value of a register by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.general
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value.as_str())
    }

    /// Pairs register names with the `register-values` list of an answer.
    fn from_values(names: &[String], values: &Value) -> Result<Self> {
        let mut by_number = BTreeMap::new();

        for entry in values.items().filter_map(Value::as_tuple) {
            let number: usize = entry
                .get_str("number")
                .and_then(|n| n.parse().ok())
                .ok_or(CommandError::Malformed("register-values.number"))?;

            let value = entry
                .get_str("value")
                .ok_or(CommandError::Malformed("register-values.value"))?;

            if let Some(name) = names.get(number).filter(|name| !name.is_empty()) {
                by_number.insert(number, (name.clone(), value.to_owned()));
            }
        }

        let mut snapshot = Self {
            general: by_number.into_values().collect(),
            ..Self::default()
        };

        snapshot.program_counter = PROGRAM_COUNTER_NAMES
            .iter()
            .find_map(|name| snapshot.get(name))
            .map(str::to_owned);
        snapshot.link_register = snapshot.get("lr").map(str::to_owned);
        snapshot.counter_register = snapshot.get("ctr").map(str::to_owned);

        Ok(snapshot)
    }
}

impl MiSession {
    /// Returns the last fetched register snapshot.
    pub fn last_registers(&self) -> Option<RegisterSnapshot> {
        lock(&self.registers).clone()
    }

    async fn register_names(&self) -> Result<Arc<Vec<String>>> {
        if let Some(names) = lock(&self.register_names).clone() {
            return Ok(names);
        }

        let results = self.command("-data-list-register-names").await?;

        let names: Vec<String> = results
            .get("register-names")
            .ok_or(CommandError::Malformed("register-names"))?
            .items()
            .map(|name| name.as_str().unwrap_or_default().to_owned())
            .collect();

        let names = Arc::new(names);
        *lock(&self.register_names) = Some(Arc::clone(&names));

        Ok(names)
    }

    /// Fetches the register values of the target.
    ///
    /// Register names are fetched once per session.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_registers(&self) -> Result<RegisterSnapshot> {
        let names = self.register_names().await?;

        let results = self.command("-data-list-register-values x").await?;

        let values = results
            .get("register-values")
            .ok_or(CommandError::Malformed("register-values"))?;

        let snapshot = RegisterSnapshot::from_values(&names, values)?;
        *lock(&self.registers) = Some(snapshot.clone());

        Ok(snapshot)
    }
}
