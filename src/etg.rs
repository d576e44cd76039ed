// FlagVet - Veto evaluation engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Event trigger generator (ETG) parameters.
//!
//! Each trigger generator names its columns differently; the partitioner
//! needs to know which column holds the event time. Equivalent generator
//! names map onto one canonical name.

use serde::{Deserialize, Serialize};

/// Column names used by one trigger generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtgParameters {
    /// Event time column
    pub time: String,
    /// Frequency column
    pub frequency: String,
    /// Signal-to-noise column
    pub snr: String,
}

impl Default for EtgParameters {
    fn default() -> Self {
        Self {
            time: "time".to_string(),
            frequency: "peak_frequency".to_string(),
            snr: "snr".to_string(),
        }
    }
}

const EQUIVALENTS: &[&[&str]] = &[
    &["cwb", "coherent_waveburst", "waveburst"],
    &["excesspower", "gstlal_excesspower", "ep"],
    &[
        "ahope",
        "daily_ahope",
        "daily_cbc",
        "inspiral",
        "gstlal_inspiral",
        "daily_ahope_bns",
        "daily_ahope_nsbh",
        "daily_ahope_bbh",
    ],
    &["kleinewelle", "kw"],
    &["dmtomega", "dmt_omega"],
    &["pycbc", "pycbc_live"],
];

/// Normalise a generator name: lowercase, runs of non-alphanumerics become
/// `_`, and known aliases collapse to their canonical name.
pub fn canonical_etg_name(name: &str) -> String {
    let mut normalised = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            normalised.push(c.to_ascii_lowercase());
            in_separator = false;
        } else if !in_separator {
            normalised.push('_');
            in_separator = true;
        }
    }

    EQUIVALENTS
        .iter()
        .find(|group| group.contains(&normalised.as_str()))
        .map(|group| group[0].to_string())
        .unwrap_or(normalised)
}

/// Column parameters for `etg`; unknown generators get the defaults.
///
/// `ifo` fills detector-specific column names (cWB prefixes them with the
/// interferometer).
pub fn etg_parameters(etg: &str, ifo: Option<&str>) -> EtgParameters {
    let defaults = EtgParameters::default();
    let ifo = ifo.unwrap_or("");
    match canonical_etg_name(etg).as_str() {
        "omicron" => EtgParameters {
            time: "peak".to_string(),
            ..defaults
        },
        "kleinewelle" | "excesspower" => EtgParameters {
            time: "peak".to_string(),
            frequency: "central_freq".to_string(),
            ..defaults
        },
        "cwb" => EtgParameters {
            time: format!("time for {ifo} detector"),
            frequency: "central frequency".to_string(),
            snr: format!("sSNR for {ifo} detector"),
        },
        "ahope" => EtgParameters {
            frequency: "template_duration".to_string(),
            ..defaults
        },
        "pycbc" => EtgParameters {
            time: "end_time".to_string(),
            frequency: "template_duration".to_string(),
            ..defaults
        },
        _ => defaults,
    }
}
