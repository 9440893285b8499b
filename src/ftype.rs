use crate::directory::Entity;
use std::collections::HashMap;

type RootClassId = &'static str;

lazy_static! {
    static ref CONTAINER_TYPE_MAP: HashMap<RootClassId, ContainerType> = {
        HashMap::from([
            ("00020906-0000-0000-C000-000000000046", ContainerType::Word97),
            ("00020900-0000-0000-C000-000000000046", ContainerType::Word6),
            ("00020820-0000-0000-C000-000000000046", ContainerType::Excel97),
            ("00020810-0000-0000-C000-000000000046", ContainerType::Excel5),
            (
                "64818D10-4F9B-11CF-86EA-00AA00B929E8",
                ContainerType::Powerpoint97,
            ),
            (
                "000C1084-0000-0000-C000-000000000046",
                ContainerType::MsiDatabase,
            ),
        ])
    };
}

/// Best-effort classification of what application wrote the container,
/// derived from the root entity's CLSID. Says nothing about the streams
/// inside; `Generic` covers every unregistered or absent CLSID.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ContainerType {
    Word97,
    Word6,
    Excel97,
    Excel5,
    Powerpoint97,
    MsiDatabase,
    Generic,
}

pub fn container_type(root: &Entity) -> ContainerType {
    root.clsid()
        .and_then(|clsid| CONTAINER_TYPE_MAP.get(clsid).copied())
        .unwrap_or(ContainerType::Generic)
}
