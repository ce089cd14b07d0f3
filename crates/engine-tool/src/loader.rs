//! Interface and mapping file loading, grounded on
//! `bone.py::Bone.__init__`'s `yaml.safe_load` of the interface and mapping
//! files.

use std::path::Path;

use engine_core::descriptor::{InterfaceDescriptor, MappingDescriptor};
use engine_core::error::{InterfaceDescriptorError, MappingDescriptorError};

pub fn load_interface(path: &Path) -> Result<InterfaceDescriptor, InterfaceDescriptorError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| InterfaceDescriptorError(format!("reading {path:?}: {e}")))?;
    serde_yaml::from_str(&raw).map_err(|e| InterfaceDescriptorError(format!("parsing {path:?}: {e}")))
}

pub fn load_mapping(path: &Path) -> Result<MappingDescriptor, MappingDescriptorError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| MappingDescriptorError(format!("reading {path:?}: {e}")))?;
    serde_yaml::from_str(&raw).map_err(|e| MappingDescriptorError(format!("parsing {path:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_well_formed_interface() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("interface.yml");
        std::fs::write(
            &path,
            r#"
inputs:
  - { name: target, mandatory: 1 }
  - { name: ports, mandatory: 0 }
command:
  - "nmap"
  - "-p"
  - "{{ports}}"
  - "{{target}}"
image:
  context: "."
  tag: "skelet0wn/nmap"
"#,
        )
        .unwrap();
        let interface = load_interface(&path).unwrap();
        assert!(interface.input("target").unwrap().mandatory);
        assert!(!interface.input("ports").unwrap().mandatory);
    }

    #[test]
    fn loads_a_mapping_with_both_provider_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.yml");
        std::fs::write(
            &path,
            r#"
target:
  type: static
  value: "10.0.0.1"
wordlist:
  type: dynamic
  query:
    root: previous
    collection: temp
    projection: { "result.filepath": 1 }
"#,
        )
        .unwrap();
        let mapping = load_mapping(&path).unwrap();
        assert_eq!(mapping.len(), 2);
    }

    #[test]
    fn malformed_yaml_is_an_interface_descriptor_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("interface.yml");
        std::fs::write(&path, "not: [valid").unwrap();
        assert!(load_interface(&path).is_err());
    }
}
