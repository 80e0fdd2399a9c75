use std::collections::BTreeMap;
use std::io::Read;
use std::path::Component;

use serde::{Deserialize, Serialize};

use crate::HelmError;

const CHART_FILE: &str = "Chart.yaml";

/// Descriptive metadata from a chart's `Chart.yaml`.
///
/// Serializes with the field order and omission rules Helm uses, so the
/// JSON form is stable for a given `Chart.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub home: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<Maintainer>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub condition: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tags: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_version: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kube_version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<serde_json::Value>,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub chart_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maintainer {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

/// A downloaded chart package together with its parsed metadata.
#[derive(Debug, Clone)]
pub struct ChartArchive {
    bytes: Vec<u8>,
    metadata: ChartMetadata,
}

impl ChartArchive {
    /// Parse a `.tgz` chart package.
    ///
    /// The package must contain `<chart>/Chart.yaml` with a name and version.
    pub fn load(bytes: Vec<u8>) -> Result<Self, HelmError> {
        let content = read_chart_file(&bytes)?;
        let metadata: ChartMetadata = serde_yaml_ng::from_str(&content)
            .map_err(|e| HelmError::InvalidChart(format!("parse {CHART_FILE}: {e}")))?;

        if metadata.name.is_empty() {
            return Err(HelmError::InvalidChart(format!(
                "{CHART_FILE} has no chart name"
            )));
        }
        if metadata.version.is_empty() {
            return Err(HelmError::InvalidChart(format!(
                "chart '{}': {CHART_FILE} has no version",
                metadata.name
            )));
        }

        Ok(Self { bytes, metadata })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn metadata(&self) -> &ChartMetadata {
        &self.metadata
    }

    /// Metadata encoded as compact JSON.
    pub fn metadata_json(&self) -> Result<Vec<u8>, HelmError> {
        serde_json::to_vec(&self.metadata).map_err(|e| {
            HelmError::InvalidChart(format!(
                "chart '{}': encode metadata: {e}",
                self.metadata.name
            ))
        })
    }
}

/// Read the top-level `Chart.yaml` out of a gzip tarball.
fn read_chart_file(archive_bytes: &[u8]) -> Result<String, HelmError> {
    let gz = flate2::read::GzDecoder::new(archive_bytes);
    let mut archive = tar::Archive::new(gz);

    for entry in archive
        .entries()
        .map_err(|e| HelmError::InvalidChart(format!("read archive entries: {e}")))?
    {
        let mut entry =
            entry.map_err(|e| HelmError::InvalidChart(format!("read archive entry: {e}")))?;

        let path = entry
            .path()
            .map_err(|e| HelmError::InvalidChart(format!("read entry path: {e}")))?
            .into_owned();

        // `<chart>/Chart.yaml` only; subcharts live deeper in `charts/`
        let components: Vec<Component> = path
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();
        let is_chart_file = components.len() == 2
            && matches!(components[0], Component::Normal(_))
            && components[1].as_os_str() == CHART_FILE;

        if is_chart_file {
            let mut content = String::new();
            entry
                .read_to_string(&mut content)
                .map_err(|e| HelmError::InvalidChart(format!("read {CHART_FILE}: {e}")))?;
            return Ok(content);
        }
    }

    Err(HelmError::InvalidChart(format!(
        "archive does not include {CHART_FILE}"
    )))
}
