use std::collections::HashMap;

use bigdecimal::BigDecimal;

use crate::bail;
use crate::error::{ErrorKind, SinkResult};

/// Boolean words and numbers accepted and produced by codecs.
#[derive(Debug, Clone, PartialEq)]
pub struct BooleanFormat {
    inputs: HashMap<String, bool>,
    true_output: String,
    false_output: String,
    true_number: BigDecimal,
    false_number: BigDecimal,
}

impl BooleanFormat {
    /// Builds the format from `true:false` word pairs and the `[true, false]` numbers.
    ///
    /// The first pair is used for formatting.
    pub fn new(words: &[String], numbers: &[i64]) -> SinkResult<Self> {
        let mut inputs = HashMap::with_capacity(words.len() * 2);
        let mut outputs = None;

        for pair in words {
            let Some((yes, no)) = pair.split_once(':') else {
                bail!(
                    ErrorKind::ConfigError,
                    "Invalid boolean words",
                    format!("`{pair}` is not a `true:false` pair")
                );
            };

            let (yes, no) = (yes.trim(), no.trim());
            inputs.insert(yes.to_lowercase(), true);
            inputs.insert(no.to_lowercase(), false);
            outputs.get_or_insert_with(|| (yes.to_string(), no.to_string()));
        }

        let Some((true_output, false_output)) = outputs else {
            bail!(ErrorKind::ConfigError, "Invalid boolean words", "no word pairs configured");
        };

        let [true_number, false_number] = numbers else {
            bail!(
                ErrorKind::ConfigError,
                "Invalid boolean numbers",
                format!("expected two numbers, got {}", numbers.len())
            );
        };

        Ok(Self {
            inputs,
            true_output,
            false_output,
            true_number: BigDecimal::from(*true_number),
            false_number: BigDecimal::from(*false_number),
        })
    }

    /// Parses a boolean word, ignoring case.
    pub fn parse(&self, text: &str) -> SinkResult<bool> {
        match self.inputs.get(&text.trim().to_lowercase()) {
            Some(value) => Ok(*value),
            None => bail!(
                ErrorKind::ConversionError,
                "Invalid boolean value",
                format!("`{text}` is not one of the configured boolean words")
            ),
        }
    }

    /// Returns the boolean a word stands for, if any.
    pub fn lookup(&self, text: &str) -> Option<bool> {
        self.inputs.get(&text.trim().to_lowercase()).copied()
    }

    pub fn format(&self, value: bool) -> &str {
        if value { &self.true_output } else { &self.false_output }
    }

    pub fn to_number(&self, value: bool) -> &BigDecimal {
        if value { &self.true_number } else { &self.false_number }
    }

    /// Maps one of the two configured numbers back to a boolean.
    pub fn from_number(&self, number: &BigDecimal) -> SinkResult<bool> {
        if *number == self.true_number {
            Ok(true)
        } else if *number == self.false_number {
            Ok(false)
        } else {
            bail!(
                ErrorKind::ConversionError,
                "Invalid boolean value",
                format!(
                    "{number} is neither {} (true) nor {} (false)",
                    self.true_number, self.false_number
                )
            );
        }
    }
}
