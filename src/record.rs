use serde::Serialize;
use serde_json::Value;

use crate::domain::{MaterialId, PropertyId, Qualifier};
use crate::error::Hybrid3Error;

/// Primary-property name marking datasets whose data lives in an external
/// file (a CIF structure) instead of inline data points.
pub const ATOMIC_STRUCTURE: &str = "atomic structure";

/// Measurement values extracted for a primary property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "values", rename_all = "lowercase")]
pub enum PropertyData {
    /// Formatted values in source order.
    Points(Vec<String>),
    /// Data-by-file-reference only; no inline values exist.
    File,
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertySeries {
    pub id: PropertyId,
    pub name: String,
    pub unit: Option<String>,
    pub data: PropertyData,
}

/// Secondary measurement axis. The API guarantees a unit whenever the
/// descriptor itself is present, so `unit` is not optional here.
#[derive(Debug, Clone, Serialize)]
pub struct SecondarySeries {
    pub id: PropertyId,
    pub name: String,
    pub unit: String,
    pub data: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertySummary {
    pub url: String,
    pub primary: PropertySeries,
    pub secondary: Option<SecondarySeries>,
}

/// Flat per-material summary handed to the table builder. Built once by
/// [`normalize`] and never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct MaterialSummary {
    pub id: MaterialId,
    pub formula: String,
    pub organic: String,
    pub inorganic: String,
    pub properties: Vec<PropertySummary>,
}

/// Normalizes one raw combined record (`{pk, formula, organic, inorganic,
/// datasets}`) into a [`MaterialSummary`].
///
/// Pure over its input: any missing identity or dataset-shape field aborts
/// the whole material with `MalformedRecord`, so a caller never sees a
/// partial summary. Data points with a qualifier other than
/// `primary`/`secondary` are dropped.
pub fn normalize(record: &Value, base_url: &str) -> Result<MaterialSummary, Hybrid3Error> {
    let id = MaterialId::new(require_u64(record, "pk")?);
    let formula = require_str(record, "formula")?.to_string();
    let organic = require_str(record, "organic")?.to_string();
    let inorganic = require_str(record, "inorganic")?.to_string();

    let datasets = record
        .get("datasets")
        .and_then(|v| v.as_array())
        .ok_or_else(|| {
            Hybrid3Error::MalformedRecord(format!("material {id}: missing `datasets` list"))
        })?;

    let mut properties = Vec::with_capacity(datasets.len());
    for dataset in datasets {
        properties.push(normalize_dataset(id, dataset, base_url)?);
    }

    Ok(MaterialSummary {
        id,
        formula,
        organic,
        inorganic,
        properties,
    })
}

fn normalize_dataset(
    material: MaterialId,
    dataset: &Value,
    base_url: &str,
) -> Result<PropertySummary, Hybrid3Error> {
    let dataset_pk = require_u64(dataset, "pk")
        .map_err(|_| malformed(material, "dataset missing `pk`"))?;
    let url = format!("{base_url}/materials/datasets/{dataset_pk}/files/");

    let primary = dataset
        .get("primary_property")
        .filter(|v| !v.is_null())
        .ok_or_else(|| malformed(material, "dataset missing `primary_property`"))?;
    let primary_id = PropertyId::new(
        require_u64(primary, "id").map_err(|_| malformed(material, "primary property missing `id`"))?,
    );
    let primary_name = require_str(primary, "name")
        .map_err(|_| malformed(material, "primary property missing `name`"))?
        .to_string();
    let primary_unit = unit_label(dataset, "primary_unit", material)?;

    let (primary_data, secondary_data) = if primary_name == ATOMIC_STRUCTURE {
        // Structure datasets carry no inline points, only a file reference.
        (PropertyData::File, Vec::new())
    } else {
        let (primary_points, secondary_points) = partition_points(material, dataset)?;
        (PropertyData::Points(primary_points), secondary_points)
    };

    let secondary = match dataset.get("secondary_property").filter(|v| !v.is_null()) {
        None => None,
        Some(descriptor) => {
            let id = PropertyId::new(
                require_u64(descriptor, "id")
                    .map_err(|_| malformed(material, "secondary property missing `id`"))?,
            );
            let name = require_str(descriptor, "name")
                .map_err(|_| malformed(material, "secondary property missing `name`"))?
                .to_string();
            let unit =
                unit_label(dataset, "secondary_unit", material)?.ok_or_else(|| {
                    Hybrid3Error::MissingUnit {
                        material: material.to_string(),
                        property: name.clone(),
                    }
                })?;
            Some(SecondarySeries {
                id,
                name,
                unit,
                data: secondary_data,
            })
        }
    };

    Ok(PropertySummary {
        url,
        primary: PropertySeries {
            id: primary_id,
            name: primary_name,
            unit: primary_unit,
            data: primary_data,
        },
        secondary,
    })
}

/// Routes every qualified data point of the dataset's single subset group
/// into the primary or secondary series, preserving source order within
/// each partition.
fn partition_points(
    material: MaterialId,
    dataset: &Value,
) -> Result<(Vec<String>, Vec<String>), Hybrid3Error> {
    let subset = dataset
        .get("subsets")
        .and_then(|v| v.as_array())
        .and_then(|subsets| subsets.first())
        .ok_or_else(|| malformed(material, "dataset has no subsets"))?;
    let datapoints = subset
        .get("datapoints")
        .and_then(|v| v.as_array())
        .ok_or_else(|| malformed(material, "subset missing `datapoints`"))?;

    let mut primary = Vec::new();
    let mut secondary = Vec::new();
    for point in datapoints {
        let values = point
            .get("values")
            .and_then(|v| v.as_array())
            .ok_or_else(|| malformed(material, "datapoint missing `values`"))?;
        for value in values {
            let qualifier = require_str(value, "qualifier")
                .map_err(|_| malformed(material, "data value missing `qualifier`"))?;
            let formatted = require_str(value, "formatted")
                .map_err(|_| malformed(material, "data value missing `formatted`"))?;
            match Qualifier::parse(qualifier) {
                Qualifier::Primary => primary.push(formatted.to_string()),
                Qualifier::Secondary => secondary.push(formatted.to_string()),
                Qualifier::Other => {
                    tracing::debug!(%material, qualifier, "dropping data point with unknown qualifier");
                }
            }
        }
    }
    Ok((primary, secondary))
}

fn unit_label(
    dataset: &Value,
    field: &str,
    material: MaterialId,
) -> Result<Option<String>, Hybrid3Error> {
    match dataset.get(field).filter(|v| !v.is_null()) {
        None => Ok(None),
        Some(unit) => require_str(unit, "label")
            .map(|label| Some(label.to_string()))
            .map_err(|_| malformed(material, "unit object missing `label`")),
    }
}

fn require_u64(value: &Value, field: &str) -> Result<u64, Hybrid3Error> {
    value
        .get(field)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| Hybrid3Error::MalformedRecord(format!("missing numeric field `{field}`")))
}

fn require_str<'a>(value: &'a Value, field: &str) -> Result<&'a str, Hybrid3Error> {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Hybrid3Error::MalformedRecord(format!("missing string field `{field}`")))
}

fn malformed(material: MaterialId, message: &str) -> Hybrid3Error {
    Hybrid3Error::MalformedRecord(format!("material {material}: {message}"))
}
