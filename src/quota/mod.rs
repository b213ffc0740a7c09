//! Prepaid Quota Module
//!
//! Accounts buy turns; each successful generation spends exactly one.
//!
//! - `store`: the `QuotaStore` seam and its error type
//! - `supabase`: PostgREST-backed store used in production
//! - `memory`: in-process store for development and tests
//! - `gate`: `QuotaGate`, the check and the debit used by the pipeline

pub mod gate;
pub mod memory;
pub mod store;
pub mod supabase;

pub use gate::QuotaGate;
pub use memory::{InMemoryQuotaStore, StoreCall};
pub use store::{QuotaRecord, QuotaStore, StoreError, WriteOutcome};
pub use supabase::SupabaseQuotaStore;
