//! Layer manager
//!
//! Reads and rewrites the optional content configuration of one document.
//! Listing is best effort: if the structure cannot be followed, the flat
//! enumeration is returned without hierarchy. Mutations propagate errors,
//! except that an absent `OCProperties`, `D` or target array means there is
//! nothing to change.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::access::{self, KeyPath};
use super::reference::{OrderNode, RefList, Reference};
use super::types::{Layer, LayerOptions};
use crate::document::Document;
use crate::engine::Request;
use crate::error::{Result, SandboxError};

const LIST: &str = "get_layer_config";
const ADD_WITH_PARENT: &str = "add_ocg_with_parent";
const SET_VISIBILITY: &str = "set_layer_visibility";
const DELETE: &str = "delete_ocg";

/// Keys of a configuration that may mention an OCG
const CONFIG_ARRAYS: [&str; 4] = ["ON", "OFF", "Order", "Locked"];

/// Structure read from the document before hierarchy is applied
#[derive(Debug, Default)]
struct Structure {
    /// `OCGs` entries with their `Name`
    groups: Vec<(Reference, Option<String>)>,
    /// Scan of the default configuration's `Order`
    order: Vec<OrderNode>,
}

/// Layer view of a document
#[derive(Debug, Clone)]
pub struct LayerManager {
    document: Document,
}

impl LayerManager {
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// All layers with hierarchy, sorted by display order
    pub async fn config(&self) -> Result<Vec<Layer>> {
        let base = self.document.layer_ui_configs().await?;
        let mut layers: Vec<Layer> = base.into_iter().map(Layer::from).collect();

        match self.structure().await {
            Ok(structure) => apply_structure(&mut layers, &structure),
            Err(e) => {
                debug!(document = %self.document.name(), error = %e, "Layer hierarchy unavailable, using flat list");
            }
        }

        layers.sort_by_key(|layer| layer.display_order);
        Ok(layers)
    }

    async fn structure(&self) -> Result<Structure> {
        let Some(props) = access::locate_oc_properties(&self.document, LIST)
            .await
            .map_err(structural(KeyPath::new(0, "OCProperties")))?
        else {
            return Ok(Structure::default());
        };

        let mut structure = Structure::default();

        let ocgs_at = props.child("OCGs");
        if let Some((_, ocgs)) = access::read_array(&self.document, &ocgs_at, LIST)
            .await
            .map_err(structural(ocgs_at.clone()))?
        {
            for reference in ocgs.refs() {
                let name_at = KeyPath::new(reference.id, "Name");
                let name = access::read(&self.document, &name_at)
                    .await
                    .map_err(structural(name_at.clone()))?
                    .text();
                structure.groups.push((reference, name));
            }
        }

        let config_at = props.child("D");
        let config = access::locate(&self.document, &config_at, LIST)
            .await
            .map_err(structural(config_at.clone()))?;
        if let Some(config) = config {
            let order_at = config.child("Order");
            if let Some((_, order)) = access::read_array(&self.document, &order_at, LIST)
                .await
                .map_err(structural(order_at.clone()))?
            {
                structure.order = order.scan();
            }
        }

        Ok(structure)
    }

    /// Create a layer at the root of the ordering, returning its object number
    pub async fn add(&self, name: &str, options: LayerOptions) -> Result<u32> {
        let xref = self.document.add_ocg(name, options).await?;
        info!(document = %self.document.name(), layer = %name, xref, "Added layer");
        Ok(xref)
    }

    /// Create a layer nested under `parent` in the default ordering.
    ///
    /// If `parent` does not appear in the ordering the new layer stays at
    /// the root.
    pub async fn add_with_parent(&self, name: &str, parent: u32, options: LayerOptions) -> Result<u32> {
        let xref = self.add(name, options).await?;
        let child = Reference::new(xref);

        let Some(config) = access::locate_default_config(&self.document, ADD_WITH_PARENT).await? else {
            return Ok(xref);
        };
        let Some((order_at, mut order)) =
            access::read_array(&self.document, &config.child("Order"), ADD_WITH_PARENT).await?
        else {
            return Ok(xref);
        };

        order.remove_first_at_root(child);
        if order.insert_child(Reference::new(parent), child) {
            access::write(&self.document, &order_at, &order.to_string()).await?;
            debug!(document = %self.document.name(), xref, parent, "Nested layer under parent");
        } else {
            debug!(document = %self.document.name(), xref, parent, "Parent not in ordering, layer left at root");
        }
        Ok(xref)
    }

    /// Show or hide a layer in the default configuration. Idempotent.
    pub async fn set_visibility(&self, ocg: u32, on: bool) -> Result<()> {
        self.document.ensure_open(SET_VISIBILITY)?;
        let Some(config) = access::locate_default_config(&self.document, SET_VISIBILITY).await? else {
            return Ok(());
        };
        let reference = Reference::new(ocg);
        let (add_to, remove_from) = if on { ("ON", "OFF") } else { ("OFF", "ON") };

        let add_at = config.child(add_to);
        match access::read_array(&self.document, &add_at, SET_VISIBILITY).await? {
            Some((at, mut list)) => {
                if !list.contains(reference) {
                    list.push(reference);
                    access::write(&self.document, &at, &list.to_string()).await?;
                }
            }
            None => {
                let list = RefList::from_refs([reference]);
                access::write(&self.document, &add_at, &list.to_string()).await?;
            }
        }

        // An emptied array is left unwritten
        let remove_at = config.child(remove_from);
        if let Some((at, mut list)) = access::read_array(&self.document, &remove_at, SET_VISIBILITY).await? {
            if list.remove_all(reference) > 0 && !list.is_empty() {
                access::write(&self.document, &at, &list.to_string()).await?;
            }
        }

        debug!(document = %self.document.name(), ocg, on, "Set layer visibility");
        Ok(())
    }

    /// Delete the layer with enumeration number `number`.
    ///
    /// A number past the end of `OCGs` is taken as an object number. The
    /// group is removed from `OCGs` and from the default configuration's
    /// `ON`, `OFF`, `Order` and `Locked`; failures on those four are logged
    /// and skipped.
    pub async fn delete(&self, number: usize) -> Result<()> {
        self.document.ensure_open(DELETE)?;
        let Some(props) = access::locate_oc_properties(&self.document, DELETE).await? else {
            return Ok(());
        };
        let Some((ocgs_at, mut ocgs)) =
            access::read_array(&self.document, &props.child("OCGs"), DELETE).await?
        else {
            return Ok(());
        };

        let reference = match ocgs.refs().get(number) {
            Some(reference) => *reference,
            None => u32::try_from(number)
                .map(Reference::new)
                .map_err(|_| SandboxError::InvalidInput(format!("layer number {number} out of range")))?,
        };

        if ocgs.remove_all(reference) > 0 {
            access::write(&self.document, &ocgs_at, &ocgs.to_string()).await?;
        }

        if let Some(config) = access::locate(&self.document, &props.child("D"), DELETE).await? {
            for key in CONFIG_ARRAYS {
                let at = config.child(key);
                if let Err(e) = self.strip(&at, reference).await {
                    warn!(document = %self.document.name(), location = %at, error = %e, "Failed to remove layer reference");
                }
            }
        }

        info!(document = %self.document.name(), number, xref = reference.id, "Deleted layer");
        Ok(())
    }

    async fn strip(&self, at: &KeyPath, reference: Reference) -> Result<()> {
        if let Some((location, mut list)) = access::read_array(&self.document, at, DELETE).await? {
            if list.remove_all(reference) > 0 {
                access::write(&self.document, &location, &list.to_string()).await?;
            }
        }
        Ok(())
    }

    /// Put an annotation or XObject under layer `ocg`, or detach it with 0
    pub async fn set_oc(&self, xref: u32, ocg: u32) -> Result<()> {
        self.document
            .request_unit(Request::SetOc {
                name: self.document.name().to_string(),
                xref,
                ocg,
            })
            .await
    }

    /// Layer controlling `xref`, 0 when none
    pub async fn get_oc(&self, xref: u32) -> Result<u32> {
        self.document
            .request_json(Request::GetOc {
                name: self.document.name().to_string(),
                xref,
            })
            .await
    }
}

fn structural(at: KeyPath) -> impl FnOnce(SandboxError) -> SandboxError {
    move |source| {
        debug!(location = %at, error = %source, "Structure lookup failed");
        SandboxError::StructuralResolution {
            xref: at.xref,
            path: at.path,
        }
    }
}

/// Fill `xref`, `parent_xref`, `depth` and `display_order`.
///
/// Each OCG goes to the first layer with the same text; a layer keeps the
/// first OCG matched to it. Display order counts only ordering entries that
/// match a layer. When a reference occurs more than once in the ordering,
/// the last occurrence wins.
fn apply_structure(layers: &mut [Layer], structure: &Structure) {
    for (reference, name) in &structure.groups {
        let Some(name) = name else {
            continue;
        };
        if let Some(layer) = layers.iter_mut().find(|layer| layer.text == *name) {
            if layer.xref == 0 {
                layer.xref = reference.id;
            }
        }
    }

    let by_xref: HashMap<u32, usize> = layers
        .iter()
        .enumerate()
        .filter(|(_, layer)| layer.is_located())
        .map(|(idx, layer)| (layer.xref, idx))
        .collect();

    let matched = structure
        .order
        .iter()
        .filter_map(|node| by_xref.get(&node.reference.id).map(|&idx| (idx, node)));
    for (display_order, (idx, node)) in matched.enumerate() {
        let layer = &mut layers[idx];
        layer.depth = node.depth;
        layer.parent_xref = node.parent.map(|parent| parent.id).unwrap_or(0);
        layer.display_order = display_order;
    }
}
