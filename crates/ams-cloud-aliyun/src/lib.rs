//! Alibaba Cloud vendor controller
//!
//! Log collection on Alibaba Cloud is configured in-cluster, outside this
//! controller. Only the SLS viewer URLs are composed here; every other
//! capability reports [`ams_cloud::CloudError::Unsupported`].

mod controller;

pub use controller::{AliyunController, AliyunSettings};
