use std::fmt;

/// Dispatcher and translator counters, printed by `--stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecStats {
    /// `lookup_or_translate` calls made by the dispatcher.
    pub lookups: u64,
    /// Lookups answered from the code cache.
    pub cache_hits: u64,
    /// Blocks translated, eager ones included.
    pub translations: u64,
    /// Return-target blocks translated ahead of time for a call site.
    pub eager_translations: u64,
    /// Times the dispatcher entered translated code.
    pub block_entries: u64,
    /// Returns that went straight to host code.
    pub return_hits: u64,
    /// Returns that fell back to the dispatcher.
    pub return_misses: u64,
    pub ecalls: u64,
}

impl fmt::Display for ExecStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "exec stats:")?;
        writeln!(f, "  lookups             {}", self.lookups)?;
        writeln!(f, "  cache hits          {}", self.cache_hits)?;
        writeln!(
            f,
            "  translations        {} ({} eager)",
            self.translations, self.eager_translations
        )?;
        writeln!(f, "  block entries       {}", self.block_entries)?;
        writeln!(f, "  return stack hits   {}", self.return_hits)?;
        writeln!(f, "  return stack misses {}", self.return_misses)?;
        writeln!(f, "  ecalls              {}", self.ecalls)
    }
}
