use std::collections::HashSet;

/// Outcome of classifying a single `(service, operation)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    ReadOnly,
    Mutating,
    Unknown,
}

/// Operation-name prefixes that list/describe state without changing it.
const READ_ONLY_PREFIXES: &[&str] = &[
    "Describe", "Get", "List", "Head", "Select", "Query", "Scan", "BatchGet", "Lookup",
];

/// Operation-name prefixes that create, change, or remove state.
const MUTATING_PREFIXES: &[&str] = &[
    "Create", "Update", "Delete", "Put", "Modify", "Attach", "Detach", "Associate",
    "Disassociate", "Start", "Stop", "Reboot", "Terminate", "Run", "Revoke", "Authorize",
    "Enable", "Disable",
];

/// Classify an operation name by prefix alone, ignoring any handler
/// allow-list. Used as the fallback behind `SafetyGate::classify`.
///
/// `S3.PutObject` is deliberately not special-cased here: any opt-in
/// allow-list for a mutating operation is handled by `SafetyGate`'s explicit
/// allow-list layer, never by loosening this prefix table.
pub fn classify_by_prefix(operation: &str) -> Classification {
    if READ_ONLY_PREFIXES.iter().any(|p| operation.starts_with(p)) {
        return Classification::ReadOnly;
    }
    if MUTATING_PREFIXES.iter().any(|p| operation.starts_with(p)) {
        return Classification::Mutating;
    }
    Classification::Unknown
}

/// A frozen set of operations a handler declared it uses, registered once at
/// handler construction and checked ahead of the prefix rules.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    read_only_ops: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(ops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AllowList {
            read_only_ops: ops.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, operation: &str) -> bool {
        self.read_only_ops.contains(operation)
    }
}
