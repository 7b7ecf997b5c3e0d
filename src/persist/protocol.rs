//! Stored cell format and the gateway HTTP wire types.
//!
//! ```text
//! POST   /save-sphere-data   {"cellKey": "2,3", "positions": {...}}      -> 200
//! POST   /get-sphere-data    {"cellKeys": ["2,3", "4,5"]}                -> {"2,3": {"positions": {...}}, "4,5": null}
//! DELETE /delete-all-cells                                               -> 200
//! ```
//!
//! `positions` maps a category name to an array of `{x, y, z, ...meta}`
//! objects. Entries are kept as raw JSON until they are converted into
//! entities, so one malformed entry costs only that entry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::Vec3;
use crate::world::{Category, CellContents, CellCoord, Entity, EntityMeta};
use super::gateway::{FetchResult, GatewayError};

pub const SAVE_PATH: &str = "/save-sphere-data";
pub const FETCH_PATH: &str = "/get-sphere-data";
pub const DELETE_ALL_PATH: &str = "/delete-all-cells";

/// Persisted form of one cell
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredCell {
    #[serde(default)]
    pub positions: BTreeMap<String, Vec<Value>>,
}

/// One persisted entity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredEntity {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(flatten)]
    pub meta: EntityMeta,
}

impl StoredCell {
    /// Encode every non-empty category of `contents`.
    pub fn from_contents(contents: &CellContents) -> Result<Self, GatewayError> {
        let mut positions = BTreeMap::new();
        for category in Category::ALL {
            let entities = contents.entities(category);
            if entities.is_empty() {
                continue;
            }
            let encoded = entities
                .iter()
                .map(|e| {
                    serde_json::to_value(StoredEntity {
                        x: e.position.x,
                        y: e.position.y,
                        z: e.position.z,
                        meta: e.meta.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            positions.insert(category.name().to_string(), encoded);
        }
        Ok(Self { positions })
    }

    /// Decode into entities of `cell`.
    ///
    /// Entries without finite numeric `x`/`y`/`z`, and whole categories with
    /// an unknown name, are dropped with a warning. Returns the contents and
    /// the number of dropped entries.
    pub fn to_contents(&self, cell: CellCoord) -> (CellContents, usize) {
        let mut contents = CellContents::new(cell);
        let mut dropped = 0;

        for (name, values) in &self.positions {
            let Some(category) = Category::from_name(name) else {
                log::warn!("Cell {cell}: unknown category {name:?}, dropping {} entries", values.len());
                dropped += values.len();
                continue;
            };
            for value in values {
                match decode_entity(value) {
                    Some(stored) => {
                        let position = Vec3::new(stored.x, stored.y, stored.z);
                        contents.push(Entity {
                            position,
                            category,
                            cell,
                            meta: stored.meta,
                        });
                    }
                    None => {
                        log::warn!("Cell {cell}: malformed {name} entry dropped: {value}");
                        dropped += 1;
                    }
                }
            }
        }
        (contents, dropped)
    }

    pub fn entity_count(&self) -> usize {
        self.positions.values().map(Vec::len).sum()
    }
}

fn decode_entity(value: &Value) -> Option<StoredEntity> {
    // Coordinates must be finite JSON numbers; strings and null are rejected here
    let obj = value.as_object()?;
    let axis = |name: &str| {
        let v = obj.get(name)?.as_f64()? as f32;
        v.is_finite().then_some(v)
    };
    let (x, y, z) = (axis("x")?, axis("y")?, axis("z")?);
    Some(StoredEntity {
        x,
        y,
        z,
        meta: decode_meta(obj),
    })
}

/// Metadata never rejects an entity. Known fields of an unexpected shape
/// stay in `extra` under their own key, so they are re-encoded unchanged.
fn decode_meta(obj: &Map<String, Value>) -> EntityMeta {
    let mut meta = EntityMeta::default();
    for (key, value) in obj {
        match (key.as_str(), value) {
            ("x" | "y" | "z", _) => {}
            ("name", Value::String(name)) => meta.name = Some(name.clone()),
            ("owner", Value::String(owner)) => meta.owner = Some(owner.clone()),
            ("buildings", Value::Array(items)) if !items.is_empty() => {
                meta.buildings = items.clone()
            }
            _ => {
                meta.extra.insert(key.clone(), value.clone());
            }
        }
    }
    meta
}

/// `POST /save-sphere-data` body
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub cell_key: String,
    #[serde(default)]
    pub positions: BTreeMap<String, Vec<Value>>,
}

impl SaveRequest {
    pub fn new(cell: CellCoord, stored: &StoredCell) -> Self {
        Self {
            cell_key: cell.key(),
            positions: stored.positions.clone(),
        }
    }

    pub fn into_parts(self) -> Result<(CellCoord, StoredCell), GatewayError> {
        let cell = parse_key(&self.cell_key)?;
        Ok((cell, StoredCell { positions: self.positions }))
    }
}

/// `POST /get-sphere-data` body
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    pub cell_keys: Vec<String>,
}

impl FetchRequest {
    pub fn new(cells: &[CellCoord]) -> Self {
        Self {
            cell_keys: cells.iter().map(CellCoord::key).collect(),
        }
    }

    pub fn cells(&self) -> Result<Vec<CellCoord>, GatewayError> {
        self.cell_keys.iter().map(|k| parse_key(k)).collect()
    }
}

/// `POST /get-sphere-data` response, keyed by cell key
pub type FetchResponse = BTreeMap<String, Option<StoredCell>>;

pub fn encode_fetch_response(result: &FetchResult) -> FetchResponse {
    result.iter().map(|(cell, stored)| (cell.key(), stored.clone())).collect()
}

/// Map a response back onto the requested cells. Requested keys missing from
/// the response are misses; unrequested keys are ignored.
pub fn decode_fetch_response(
    response: FetchResponse,
    requested: &[CellCoord],
) -> Result<FetchResult, GatewayError> {
    let mut result: FetchResult = requested.iter().map(|c| (*c, None)).collect();
    for (key, stored) in response {
        let cell = parse_key(&key)?;
        if let Some(slot) = result.get_mut(&cell) {
            *slot = stored;
        }
    }
    Ok(result)
}

fn parse_key(key: &str) -> Result<CellCoord, GatewayError> {
    CellCoord::from_key(key).map_err(|_| GatewayError::InvalidKey(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_contents() -> CellContents {
        let cell = CellCoord::new(2, 3);
        let mut contents = CellContents::new(cell);
        let mut star = Entity::new(Vec3::new(2100.25, -100.0, 3999.5), Category::Star, cell);
        star.meta.name = Some("Kepler".to_string());
        star.meta.owner = Some("guild-7".to_string());
        star.meta.buildings = vec![json!({"kind": "shipyard", "level": 2})];
        star.meta.extra.insert("credits".to_string(), json!(1200));
        contents.push(star);
        contents.push(Entity::new(Vec3::new(2110.0, -100.0, 3990.1), Category::GasGiant, cell));
        contents.push(Entity::new(Vec3::new(2112.0, -100.0, 3991.7), Category::RockyMoon, cell));
        contents
    }

    #[test]
    fn test_contents_roundtrip_exact() {
        let contents = sample_contents();
        let stored = StoredCell::from_contents(&contents).unwrap();
        assert_eq!(stored.entity_count(), 3);
        assert!(!stored.positions.contains_key("ice_moon"));

        let json = serde_json::to_string(&stored).unwrap();
        let back: StoredCell = serde_json::from_str(&json).unwrap();
        let (decoded, dropped) = back.to_contents(contents.cell);
        assert_eq!(dropped, 0);
        assert_eq!(decoded, contents);
    }

    #[test]
    fn test_malformed_entries_dropped() {
        let stored: StoredCell = serde_json::from_value(json!({
            "positions": {
                "star": [
                    {"x": 1.0, "y": 2.0, "z": 3.0},
                    {"x": "1", "y": 2.0, "z": 3.0},
                    {"x": 1.0, "y": 2.0},
                    {"x": null, "y": 2.0, "z": 3.0},
                    42
                ],
                "comet": [{"x": 0.0, "y": 0.0, "z": 0.0}]
            }
        }))
        .unwrap();

        let (contents, dropped) = stored.to_contents(CellCoord::new(0, 0));
        assert_eq!(dropped, 5);
        assert_eq!(contents.len(), 1);
        assert_eq!(contents.entities(Category::Star)[0].position, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_unusual_metadata_shapes_kept() {
        let entries = vec![
            json!({"x": 1.0, "y": 0.0, "z": 0.0, "buildings": null}),
            json!({"x": 2.0, "y": 0.0, "z": 0.0, "name": 42}),
            json!({"x": 3.0, "y": 0.0, "z": 0.0, "buildings": {"shipyard": 2}}),
            json!({"x": 4.0, "y": 0.0, "z": 0.0, "owner": {"id": 7}, "name": "Deneb"}),
            json!({"x": 5.0, "y": 0.0, "z": 0.0, "name": null, "buildings": []}),
        ];
        let mut stored = StoredCell::default();
        stored.positions.insert("star".to_string(), entries.clone());

        let cell = CellCoord::new(0, 0);
        let (contents, dropped) = stored.to_contents(cell);
        assert_eq!(dropped, 0);
        assert_eq!(contents.len(), 5);

        let stars = contents.entities(Category::Star);
        assert_eq!(stars[1].meta.name, None);
        assert_eq!(stars[1].meta.extra["name"], json!(42));
        assert_eq!(stars[3].meta.name.as_deref(), Some("Deneb"));
        assert_eq!(stars[3].meta.extra["owner"], json!({"id": 7}));

        // Saving the cell back writes the same JSON it was read from
        let resaved = StoredCell::from_contents(&contents).unwrap();
        assert_eq!(resaved.positions["star"], entries);
    }

    #[test]
    fn test_wire_field_names() {
        let cell = CellCoord::new(-1, 4);
        let save = SaveRequest::new(cell, &StoredCell::default());
        let value = serde_json::to_value(&save).unwrap();
        assert_eq!(value["cellKey"], json!("-1,4"));
        assert!(value.get("positions").is_some());

        let fetch = FetchRequest::new(&[cell, CellCoord::new(0, 0)]);
        assert_eq!(serde_json::to_value(&fetch).unwrap(), json!({"cellKeys": ["-1,4", "0,0"]}));
        assert_eq!(fetch.cells().unwrap(), vec![cell, CellCoord::new(0, 0)]);
    }

    #[test]
    fn test_fetch_response_null_is_miss() {
        let requested = [CellCoord::new(2, 3), CellCoord::new(4, 5), CellCoord::new(6, 7)];
        let response: FetchResponse = serde_json::from_value(json!({
            "2,3": {"positions": {"star": [{"x": 0.0, "y": 0.0, "z": 0.0}]}},
            "4,5": null,
            "9,9": null
        }))
        .unwrap();
        let result = decode_fetch_response(response, &requested).unwrap();
        assert_eq!(result.len(), 3);
        assert!(result[&requested[0]].is_some());
        assert!(result[&requested[1]].is_none());
        assert!(result[&requested[2]].is_none());
    }

    #[test]
    fn test_fetch_response_bad_key_rejected() {
        let response: FetchResponse = serde_json::from_value(json!({"nope": null})).unwrap();
        assert!(matches!(
            decode_fetch_response(response, &[]),
            Err(GatewayError::InvalidKey(_))
        ));
    }
}
