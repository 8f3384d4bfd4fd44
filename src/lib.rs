//! Declares a static website on AWS (S3 origin, CloudFront, Route53 alias records,
//! an ACM certificate, a viewer-request function, a security headers policy and
//! monitoring) as a CloudFormation template, and deploys it.
//!
//! Synthesis is plain synchronous code in [`site_stack`]. Each step declares its
//! resources into a [`stack::Stack`] and hands back a handle that later steps take
//! as input. [`deploy`] drives CloudFormation and uploads the site contents.

pub mod context;
pub mod deploy;
pub mod deployment;
pub mod errors;
pub mod monitoring;
pub mod resources;
pub mod site_stack;
pub mod stack;

pub use errors::{Result, StackError};
