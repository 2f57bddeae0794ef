use uuid::Uuid;

/// Root of UIDs derived from a UUID, as defined in PS3.5 B.2.
const UUID_ROOT: &str = "2.25";

/// Source of DICOM unique identifiers.
pub trait UidGenerator {
    fn next_uid(&mut self) -> String;
}

/// Random UUID based UIDs (`2.25.<uuid as decimal>`).
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidUidGenerator;

impl UidGenerator for UuidUidGenerator {
    fn next_uid(&mut self) -> String {
        format!("{UUID_ROOT}.{}", Uuid::new_v4().as_u128())
    }
}
