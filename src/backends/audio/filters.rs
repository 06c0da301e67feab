// SPDX-License-Identifier: GPL-3.0-only

//! Audio filter chain description
//!
//! A filter is a GStreamer element applied between the decoder and the
//! resampler. Filters are linked source to sink in the order they were added.

use crate::errors::{AudioError, AudioResult};
use gstreamer as gst;

/// One element of the audio filter chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFilter {
    /// Element factory name, e.g. `volume` or `audiocheblimit`
    pub name: String,
    /// Properties as `key=value:key=value`
    pub args: String,
    /// Disambiguates two filters of the same kind
    pub key: String,
}

impl AudioFilter {
    pub fn new(name: impl Into<String>, args: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: args.into(),
            key: key.into(),
        }
    }

    /// Name of the element instance in the pipeline
    pub fn element_name(&self) -> String {
        format!("{}{}", self.name, self.key).to_uppercase()
    }

    /// Parsed `(property, value)` pairs; entries without `=` are ignored
    pub fn properties(&self) -> Vec<(&str, &str)> {
        self.args
            .split(':')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.trim(), v.trim()))
            .filter(|(k, _)| !k.is_empty())
            .collect()
    }

    /// Fragment for a `gst::parse::launch` description
    pub fn launch_fragment(&self) -> String {
        let mut fragment = format!("{} name={}", self.name, self.element_name());
        for (key, value) in self.properties() {
            fragment.push_str(&format!(" {}=\"{}\"", key, value.replace('"', "")));
        }
        fragment
    }

    /// Fail when the element is not installed
    pub fn check_available(&self) -> AudioResult<()> {
        if gst::ElementFactory::find(&self.name).is_none() {
            return Err(AudioError::Filter(format!("Unknown audio filter {}", self.name)));
        }
        Ok(())
    }
}

/// Parse `name|args|key;name|args|key` as stored in camera settings
pub fn parse_filter_list(config: &str) -> Vec<AudioFilter> {
    config
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(3, '|');
            let name = parts.next().unwrap_or_default().trim();
            let args = parts.next().unwrap_or_default().trim();
            let key = parts.next().unwrap_or_default().trim();
            AudioFilter::new(name, args, key)
        })
        .filter(|filter| !filter.name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_name_uppercases_name_and_key() {
        let filter = AudioFilter::new("volume", "volume=0.5", "a1");
        assert_eq!(filter.element_name(), "VOLUMEA1");
    }

    #[test]
    fn test_properties_parsing() {
        let filter = AudioFilter::new("audiocheblimit", "mode=high-pass:cutoff=200:junk", "");
        assert_eq!(
            filter.properties(),
            vec![("mode", "high-pass"), ("cutoff", "200")]
        );
        assert_eq!(
            filter.launch_fragment(),
            "audiocheblimit name=AUDIOCHEBLIMIT mode=\"high-pass\" cutoff=\"200\""
        );
    }

    #[test]
    fn test_filter_list() {
        let filters = parse_filter_list("volume|volume=2|1; ;audiocheblimit|cutoff=300");
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].key, "1");
        assert_eq!(filters[1].args, "cutoff=300");
        assert!(filters[1].key.is_empty());
    }
}
