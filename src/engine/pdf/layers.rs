//! Optional content groups
//!
//! Layer enumeration follows `/OCProperties/OCGs`: layer number `n` is the
//! n-th entry of that array.

use std::collections::HashSet;

use lopdf::{Dictionary, Document, Object};

use super::keys::{array_mut, catalog_id, deref, object_dict, object_dict_mut, object_id};
use super::syntax::{name, object_text, text_string};
use crate::engine::EngineError;
use crate::ocg::{LayerOptions, LayerUiConfig};

fn oc_properties(doc: &Document) -> Result<Option<&Dictionary>, EngineError> {
    let catalog = object_dict(doc, catalog_id(doc)?)?;
    match catalog.get(b"OCProperties") {
        Ok(value) => Ok(deref(doc, value)?.as_dict().ok()),
        Err(_) => Ok(None),
    }
}

fn ref_ids(doc: &Document, dict: &Dictionary, key: &[u8]) -> Result<Vec<u32>, EngineError> {
    let Ok(value) = dict.get(key) else {
        return Ok(Vec::new());
    };
    let ids = match deref(doc, value)? {
        Object::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Object::Reference((id, _)) => Some(*id),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    Ok(ids)
}

pub(super) fn ui_configs(doc: &Document) -> Result<Vec<LayerUiConfig>, EngineError> {
    let Some(props) = oc_properties(doc)? else {
        return Ok(Vec::new());
    };
    let ocgs = ref_ids(doc, props, b"OCGs")?;

    let default_config = match props.get(b"D") {
        Ok(value) => deref(doc, value)?.as_dict().ok(),
        Err(_) => None,
    };
    let (base_off, on, off, locked) = match default_config {
        Some(config) => (
            matches!(config.get(b"BaseState"), Ok(Object::Name(state)) if state == b"OFF"),
            ref_ids(doc, config, b"ON")?.into_iter().collect::<HashSet<_>>(),
            ref_ids(doc, config, b"OFF")?.into_iter().collect::<HashSet<_>>(),
            ref_ids(doc, config, b"Locked")?.into_iter().collect::<HashSet<_>>(),
        ),
        None => (false, HashSet::new(), HashSet::new(), HashSet::new()),
    };

    let mut layers = Vec::with_capacity(ocgs.len());
    for (number, xref) in ocgs.into_iter().enumerate() {
        let text = object_id(doc, xref)
            .and_then(|id| object_dict(doc, id))
            .ok()
            .and_then(|ocg| ocg.get(b"Name").ok())
            .and_then(object_text)
            .unwrap_or_default();
        let visible = if base_off {
            on.contains(&xref)
        } else {
            !off.contains(&xref)
        };
        layers.push(LayerUiConfig {
            number,
            text,
            on: visible,
            locked: locked.contains(&xref),
        });
    }
    Ok(layers)
}

/// Create an OCG and register it in the chosen configuration
pub(super) fn add_ocg(doc: &mut Document, layer: &str, options: &LayerOptions) -> Result<u32, EngineError> {
    let catalog = catalog_id(doc)?.0;
    let config = usize::try_from(options.config).ok();
    if let Some(index) = config {
        let count = match oc_properties(doc)? {
            Some(props) => array_len(doc, props, b"Configs")?,
            None => 0,
        };
        if index >= count {
            return Err(EngineError::new(format!("bad config number {index}")));
        }
    }

    let mut creator = Dictionary::new();
    creator.set("Creator", text_string(env!("CARGO_PKG_NAME")));
    creator.set("Subtype", name(&options.usage));
    let mut usage = Dictionary::new();
    usage.set("CreatorInfo", Object::Dictionary(creator));

    let mut ocg = Dictionary::new();
    ocg.set("Type", name("OCG"));
    ocg.set("Name", text_string(layer));
    ocg.set("Intent", name(&options.intent));
    ocg.set("Usage", Object::Dictionary(usage));
    let id = doc.add_object(Object::Dictionary(ocg));
    let reference = Object::Reference(id);

    array_mut(doc, catalog, "OCProperties/OCGs")?.push(reference.clone());
    match config {
        None => append_to_config(doc, catalog, "OCProperties/D", reference, options.on)?,
        Some(index) => match config_object(doc, index)? {
            Some(config_xref) => append_to_config(doc, config_xref, "", reference, options.on)?,
            None => {
                let configs = array_mut(doc, catalog, "OCProperties/Configs")?;
                match configs.get_mut(index) {
                    Some(Object::Dictionary(config)) => {
                        push_into(config, "Order", reference.clone());
                        if !options.on {
                            push_into(config, "OFF", reference);
                        }
                    }
                    _ => return Err(EngineError::new(format!("config {index} is not a dictionary"))),
                }
            }
        },
    }
    Ok(id.0)
}

fn array_len(doc: &Document, dict: &Dictionary, key: &[u8]) -> Result<usize, EngineError> {
    match dict.get(key) {
        Ok(value) => Ok(deref(doc, value)?.as_array().map(Vec::len).unwrap_or(0)),
        Err(_) => Ok(0),
    }
}

/// Object number of `Configs[index]` when that entry is indirect
fn config_object(doc: &Document, index: usize) -> Result<Option<u32>, EngineError> {
    let Some(props) = oc_properties(doc)? else {
        return Ok(None);
    };
    let entry = match props.get(b"Configs") {
        Ok(value) => deref(doc, value)?
            .as_array()
            .ok()
            .and_then(|items| items.get(index)),
        Err(_) => None,
    };
    Ok(match entry {
        Some(Object::Reference((id, _))) => Some(*id),
        _ => None,
    })
}

fn push_into(dict: &mut Dictionary, key: &str, value: Object) {
    if !matches!(dict.get(key.as_bytes()), Ok(Object::Array(_))) {
        dict.set(key, Object::Array(Vec::new()));
    }
    if let Ok(Object::Array(items)) = dict.get_mut(key.as_bytes()) {
        items.push(value);
    }
}

fn append_to_config(
    doc: &mut Document,
    xref: u32,
    config_path: &str,
    reference: Object,
    on: bool,
) -> Result<(), EngineError> {
    let key = |leaf: &str| {
        if config_path.is_empty() {
            leaf.to_string()
        } else {
            format!("{config_path}/{leaf}")
        }
    };
    array_mut(doc, xref, &key("Order"))?.push(reference.clone());
    if !on {
        array_mut(doc, xref, &key("OFF"))?.push(reference);
    }
    Ok(())
}

/// Attach (`ocg > 0`) or detach (`ocg == 0`) optional content on an annotation or XObject
pub(super) fn set_oc(doc: &mut Document, xref: u32, ocg: u32) -> Result<(), EngineError> {
    let target = object_id(doc, xref)?;
    if ocg == 0 {
        object_dict_mut(doc, target)?.remove(b"OC");
        return Ok(());
    }

    let ocg_id = object_id(doc, ocg)?;
    let kind = match object_dict(doc, ocg_id)?.get(b"Type") {
        Ok(Object::Name(kind)) => kind.clone(),
        _ => Vec::new(),
    };
    if kind != b"OCG" && kind != b"OCMD" {
        return Err(EngineError::new(format!("xref {ocg} is not an OCG or OCMD")));
    }
    object_dict_mut(doc, target)?.set("OC", Object::Reference(ocg_id));
    Ok(())
}

pub(super) fn get_oc(doc: &Document, xref: u32) -> Result<u32, EngineError> {
    let dict = object_dict(doc, object_id(doc, xref)?)?;
    Ok(match dict.get(b"OC") {
        Ok(Object::Reference((id, _))) => *id,
        _ => 0,
    })
}
