//! Huawei Cloud vendor controller
//!
//! Log streams live in LTS (Log Tank Service) and are fed by AOM mapping
//! rules. LTS has no lookup by name, so [`ProvisioningProtocol`] persists the
//! stream ID before creating the rule and recovers identifiers by listing when
//! a create call reports a duplicate.
//!
//! Image tags come from SWR (Software Repository for Containers).

pub mod controller;
pub mod http;
pub mod lts;
pub mod naming;
pub mod protocol;
pub mod signer;
pub mod swr;

#[cfg(test)]
mod testing;

pub use controller::{HuaweiController, HuaweiSettings};
pub use http::SignedClient;
pub use lts::{HttpLtsApi, LogStream, LtsApi, MappingRule, MappingRuleEntry, LTS_CODES};
pub use protocol::ProvisioningProtocol;
pub use signer::Signer;
pub use swr::{HttpSwrApi, RegistryApi};
