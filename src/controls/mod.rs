pub mod account;
pub mod filesystem;
pub mod install;
pub mod modules;
pub mod network;
pub mod packages;

use crate::model::Control;

/// The full benchmark control set, one instance per requirement.
pub fn defaults() -> Vec<Box<dyn Control>> {
    vec![
        Box::new(install::NginxInstalled),
        Box::new(install::NginxFromSource),
        Box::new(packages::RepoConfigured),
        Box::new(packages::LatestPackage),
        Box::new(modules::MinimalModules),
        Box::new(modules::NoWebdavModule),
        Box::new(modules::NoGzipModules),
        Box::new(modules::AutoindexDisabled),
        Box::new(account::DedicatedServiceAccount),
        Box::new(account::ServiceAccountLocked),
        Box::new(account::ServiceAccountShell),
        Box::new(filesystem::RootOwnership),
        Box::new(filesystem::RestrictedPermissions),
        Box::new(filesystem::PidFileSecured),
        Box::new(filesystem::CoreDumpDirSecured),
        Box::new(network::AuthorizedPorts),
        Box::new(network::UnknownHostRejected),
        Box::new(network::KeepaliveTimeout),
        Box::new(network::SendTimeout),
    ]
}
