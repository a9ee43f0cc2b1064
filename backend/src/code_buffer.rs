use dbt_core::EncodingError;

/// A branch target inside one block's host code.
///
/// Jumps may reference a label before it is bound; the displacement
/// is patched when the buffer is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(u32);

impl Label {
    pub fn id(self) -> u32 {
        self.0
    }
}

/// A reference to a label that needs back-patching.
#[derive(Debug, Clone, Copy)]
struct LabelUse {
    /// Offset of the displacement field.
    offset: usize,
    kind: RelocKind,
}

/// Relocation types for label back-patching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocKind {
    /// 32-bit displacement relative to the end of the field.
    Rel32,
}

#[derive(Debug, Clone, Default)]
struct LabelState {
    value: Option<usize>,
    uses: Vec<LabelUse>,
}

/// Growable host code buffer for a single block.
///
/// Code is assembled into ordinary heap memory and copied into an
/// executable region once every label has been resolved.
#[derive(Debug, Clone, Default)]
pub struct CodeBuffer {
    data: Vec<u8>,
    labels: Vec<LabelState>,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            labels: Vec::new(),
        }
    }

    /// Current write offset.
    #[inline]
    pub fn offset(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // -- Emit methods --

    #[inline]
    pub fn emit_u8(&mut self, val: u8) {
        self.data.push(val);
    }

    #[inline]
    pub fn emit_u32(&mut self, val: u32) {
        self.data.extend_from_slice(&val.to_le_bytes());
    }

    #[inline]
    pub fn emit_u64(&mut self, val: u64) {
        self.data.extend_from_slice(&val.to_le_bytes());
    }

    /// Patch a u32 at the given offset.
    #[inline]
    pub fn patch_u32(&mut self, offset: usize, val: u32) {
        self.data[offset..offset + 4].copy_from_slice(&val.to_le_bytes());
    }

    /// Read a u32 at the given offset.
    #[inline]
    pub fn read_u32(&self, offset: usize) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.data[offset..offset + 4]);
        u32::from_le_bytes(bytes)
    }

    // -- Labels --

    pub fn new_label(&mut self) -> Label {
        let id = self.labels.len() as u32;
        self.labels.push(LabelState::default());
        Label(id)
    }

    /// Place `label` at the current offset.
    pub fn bind(&mut self, label: Label) -> Result<(), EncodingError> {
        let offset = self.offset();
        let state = &mut self.labels[label.0 as usize];
        if state.value.is_some() {
            return Err(EncodingError::LabelRebound(label.0));
        }
        state.value = Some(offset);
        Ok(())
    }

    /// Emit a placeholder displacement referring to `label`.
    pub fn emit_label_ref(&mut self, label: Label, kind: RelocKind) {
        let offset = self.offset();
        self.labels[label.0 as usize]
            .uses
            .push(LabelUse { offset, kind });
        match kind {
            RelocKind::Rel32 => self.emit_u32(0),
        }
    }

    /// Patch every label reference with its final displacement.
    pub fn resolve_links(&mut self) -> Result<(), EncodingError> {
        for id in 0..self.labels.len() {
            let (value, uses) = {
                let state = &mut self.labels[id];
                (state.value, std::mem::take(&mut state.uses))
            };
            if uses.is_empty() {
                continue;
            }
            let Some(target) = value else {
                return Err(EncodingError::UnboundLabel(id as u32));
            };
            for site in uses {
                match site.kind {
                    RelocKind::Rel32 => {
                        let disp = target as i64 - (site.offset as i64 + 4);
                        let disp = i32::try_from(disp)
                            .map_err(|_| EncodingError::DisplacementOutOfRange(disp))?;
                        self.patch_u32(site.offset, disp as u32);
                    }
                }
            }
        }
        Ok(())
    }

    /// Whether any label still has references waiting for a binding.
    pub fn has_pending_uses(&self) -> bool {
        self.labels.iter().any(|l| !l.uses.is_empty())
    }

    /// The code emitted so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}
