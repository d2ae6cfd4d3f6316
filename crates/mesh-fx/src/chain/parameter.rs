//! Parameter slots - control-side state of one effect parameter

use crate::manifest::{LinkType, ManifestParameter, ParameterKind};

/// Control-side copy of one parameter of a loaded effect
///
/// The value here is the authoritative, persisted one. The engine holds its
/// own copy inside the processor and is kept in step by requests.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSlot {
    manifest_index: usize,
    id: String,
    name: String,
    kind: ParameterKind,
    value: f32,
    default: f32,
    link_type: LinkType,
    link_inverted: bool,
    hidden: bool,
}

impl ParameterSlot {
    pub(crate) fn from_manifest(manifest_index: usize, param: &ManifestParameter) -> Self {
        Self {
            manifest_index,
            id: param.id.clone(),
            name: param.name.clone(),
            kind: param.kind,
            value: param.default,
            default: param.default,
            link_type: param.default_link,
            link_inverted: param.default_link_inverted,
            hidden: false,
        }
    }

    /// Position of the parameter in the manifest (and the processor)
    pub fn manifest_index(&self) -> usize {
        self.manifest_index
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    /// Current normalized value
    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn default(&self) -> f32 {
        self.default
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    pub fn link_inverted(&self) -> bool {
        self.link_inverted
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub(crate) fn set_value(&mut self, value: f32) {
        self.value = value.clamp(0.0, 1.0);
    }

    pub(crate) fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    pub(crate) fn set_link(&mut self, link_type: LinkType, inverted: bool) {
        self.link_type = link_type;
        self.link_inverted = inverted;
    }

    /// Value this parameter takes for a meta (super) position, if linked
    pub(crate) fn linked_value(&self, meta: f32) -> Option<f32> {
        self.link_type.apply(meta, self.link_inverted)
    }
}
