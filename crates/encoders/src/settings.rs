use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Output option name to value. Ordered so identical inputs render identical
/// command lines.
pub type Options = BTreeMap<String, String>;

/// Everything an encoder needs on the ffmpeg command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderSettings {
    /// Flags that must precede `-i`, such as device bindings.
    pub pre_input_args: Vec<String>,
    pub output_options: Options,
    pub filter_chain: Option<String>,
}

impl EncoderSettings {
    pub(crate) fn with_pre_input(mut self, args: &[&str]) -> Self {
        self.pre_input_args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub(crate) fn with_option(mut self, key: &str, value: &str) -> Self {
        self.output_options.insert(key.to_string(), value.to_string());
        self
    }

    pub(crate) fn with_filter(mut self, filter: &str) -> Self {
        self.filter_chain = Some(filter.to_string());
        self
    }

    /// Overlay `options` onto the output options; the overlay wins.
    pub fn merge_options(&mut self, options: Options) {
        self.output_options.extend(options);
    }

    /// `-key value` pairs in key order.
    pub fn output_args(&self) -> Vec<String> {
        self.output_options
            .iter()
            .flat_map(|(k, v)| [format!("-{k}"), v.clone()])
            .collect()
    }
}

pub(crate) fn set(options: &mut Options, key: &str, value: impl ToString) {
    options.insert(key.to_string(), value.to_string());
}
