//! Image and artifact naming

use dockyard_core::domain::request::BuildRequest;

/// Local name of the freshly built image, `<ns>/<container>:<version>`
pub fn base_name(namespace: &str, request: &BuildRequest) -> String {
    format!("{}/{}:{}", namespace, request.container(), request.version())
}

/// Public registry name, `<ns>/<container>:<tag>`
pub fn public_name(namespace: &str, container: &str, tag: &str) -> String {
    format!("{}/{}:{}", namespace, container, tag)
}

/// Secondary registry name, `<registry>/<ns>/<container>:<tag>`
pub fn local_name(registry: &str, namespace: &str, container: &str, tag: &str) -> String {
    format!("{}/{}", registry, public_name(namespace, container, tag))
}

/// Reference submitted to the security scanner
pub fn scan_reference(public: &str) -> String {
    format!("docker.io/{}", public)
}

/// Source reference handed to the converter
pub fn convert_source(public: &str) -> String {
    format!("docker://{}", public)
}

/// Object store key of a converted artifact
pub fn artifact_key(container: &str, tag: &str) -> String {
    format!("SingImgsRepo/{0}/{1}/{0}_{1}.sif", container, tag)
}
