//! Discovery of traffic lights and their external identifiers
//!
//! The registry gives every light a filesystem- and JSON-safe id. Readers get an
//! [`Arc`] snapshot of the mapping; a refresh builds a complete new mapping and
//! swaps it in, so no reader ever sees a half-built one.

use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::intersection::Intersection;
use super::traffic_light::TrafficLight;
use super::types::{IntersectionId, LightId, LightKey, Position};

/// Reserved id of the system-wide command inbox
pub const MANAGER_ID: &str = "manager";

/// One complete id mapping
#[derive(Debug, Clone, Default)]
pub struct RegistryMap {
    by_id: HashMap<LightId, LightKey>,
    by_key: HashMap<LightKey, LightId>,
    ordered: Vec<(LightId, LightKey)>,
}

impl RegistryMap {
    pub fn lookup(&self, id: &str) -> Option<LightKey> {
        self.by_id.get(id).copied()
    }

    pub fn id_of(&self, key: LightKey) -> Option<&LightId> {
        self.by_key.get(&key)
    }

    /// Entries in scan order
    pub fn iter(&self) -> impl Iterator<Item = (&LightId, LightKey)> {
        self.ordered.iter().map(|(id, key)| (id, *key))
    }

    pub fn ids(&self) -> Vec<LightId> {
        self.ordered.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn keys(&self) -> Vec<LightKey> {
        self.ordered.iter().map(|(_, key)| *key).collect()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    fn insert(&mut self, id: LightId, key: LightKey) {
        if self.by_id.contains_key(&id) {
            warn!("Duplicate light id {}, keeping the first light", id);
            return;
        }
        self.by_id.insert(id.clone(), key);
        self.by_key.insert(key, id.clone());
        self.ordered.push((id, key));
    }
}

/// Id assignment for every light in the scene
#[derive(Debug, Clone, Default)]
pub struct Registry {
    current: Arc<RegistryMap>,
    assigned: HashMap<LightKey, LightId>,
    next_index: usize,
}

impl Registry {
    /// Scan the scene. The first call discovers every light.
    ///
    /// Lights seen before keep their id. New lights get indices past every index
    /// handed out so far, so an id never moves to a different light.
    pub fn refresh(
        &mut self,
        lights: &BTreeMap<LightKey, TrafficLight>,
        intersections: &BTreeMap<IntersectionId, Intersection>,
    ) {
        let mut map = RegistryMap::default();

        for (key, light) in lights {
            let id = match self.assigned.get(key).cloned() {
                Some(id) => id,
                None => {
                    let intersection_name = light
                        .intersection()
                        .and_then(|id| intersections.get(&id))
                        .map(|intersection| intersection.name.as_str());
                    let id =
                        generate_light_id(intersection_name, &light.position(), self.next_index);
                    self.next_index += 1;
                    debug!("Discovered light {} at {:?}", id, light.position());
                    self.assigned.insert(*key, id.clone());
                    id
                }
            };
            map.insert(id, *key);
        }

        self.assigned.retain(|key, _| lights.contains_key(key));
        self.current = Arc::new(map);
    }

    /// The current mapping. Holding on to it is safe across refreshes.
    pub fn snapshot(&self) -> Arc<RegistryMap> {
        Arc::clone(&self.current)
    }

    pub fn lookup(&self, id: &str) -> Option<LightKey> {
        self.current.lookup(id)
    }

    pub fn id_of(&self, key: LightKey) -> Option<&LightId> {
        self.current.id_of(key)
    }

    pub fn ids(&self) -> Vec<LightId> {
        self.current.ids()
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }
}

/// Build the external id of a light.
///
/// Lights at a named intersection use the intersection name, all others their
/// rounded ground-plane position with `neg` standing in for a minus sign.
pub fn generate_light_id(
    intersection_name: Option<&str>,
    position: &Position,
    index: usize,
) -> LightId {
    match intersection_name.filter(|name| !name.is_empty()) {
        Some(name) => LightId::new(format!("light_{}_{}", sanitize_component(name), index)),
        None => LightId::new(format!(
            "light_{}_{}_{}",
            signed_component(position.x),
            signed_component(position.z),
            index
        )),
    }
}

/// Replace everything that is not safe in a file name with `_`
pub fn sanitize_component(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn signed_component(value: f32) -> String {
    let rounded = value.round() as i64;
    if rounded < 0 {
        format!("neg{}", rounded.unsigned_abs())
    } else {
        rounded.to_string()
    }
}
