use std::fmt;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};

/// Width of every identifier in the system.
pub const ID_SIZE: usize = 20;

/// Number of trailing bytes of an object ID that carry the return index
/// of the producing task. A task ID always has these bytes zeroed.
const INDEX_SUFFIX: usize = 4;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name {
            bytes: [u8; ID_SIZE],
        }

        impl $name {
            #[inline]
            pub fn from_bytes(bytes: [u8; ID_SIZE]) -> Self {
                $name { bytes }
            }

            #[inline]
            pub fn as_bytes(&self) -> &[u8; ID_SIZE] {
                &self.bytes
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                // Full IDs are unwieldy in logs; the leading bytes identify well enough.
                for byte in &self.bytes[..8] {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }
    };
}

id_type!(TaskId);
id_type!(ObjectId);
id_type!(ActorId);
id_type!(SchedulerId);

/// FNV-1a over `data`, from an arbitrary seed so that several independent
/// streams can be drawn from the same input.
fn fnv1a(seed: u64, data: &[u8]) -> u64 {
    let mut hash = seed;
    for byte in data {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100_0000_01b3);
    }
    hash
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

/// Fill `ID_SIZE - INDEX_SUFFIX` bytes deterministically from a byte stream.
/// The index suffix is left zeroed, reserving it for return-object indices.
fn digest_id(data: &[u8]) -> [u8; ID_SIZE] {
    let mut bytes = [0u8; ID_SIZE];
    let first = fnv1a(FNV_OFFSET_BASIS, data);
    let second = fnv1a(first ^ 0x9e37_79b9_7f4a_7c15, data);
    LittleEndian::write_u64(&mut bytes[0..8], first);
    LittleEndian::write_u64(&mut bytes[8..16], second);
    bytes
}

impl TaskId {
    /// Derive a task ID from the content of its spec. The same content
    /// always yields the same ID, which is what makes a re-submitted
    /// spec land on the same task- and object-table rows.
    pub fn derive(payload: &[u8], args: &[ObjectId], n_returns: usize, actor: Option<&ActorId>) -> TaskId {
        let mut content = Vec::with_capacity(payload.len() + args.len() * ID_SIZE + ID_SIZE + 16);
        content.extend_from_slice(&encode_len(payload.len()));
        content.extend_from_slice(payload);
        for arg in args {
            content.extend_from_slice(arg.as_bytes());
        }
        content.extend_from_slice(&encode_len(n_returns));
        if let Some(actor) = actor {
            content.extend_from_slice(actor.as_bytes());
        }
        TaskId::from_bytes(digest_id(&content))
    }

    /// ID of the `index`-th return object of this task.
    pub fn return_object(&self, index: u32) -> ObjectId {
        let mut bytes = *self.as_bytes();
        LittleEndian::write_u32(&mut bytes[ID_SIZE - INDEX_SUFFIX..], index + 1);
        ObjectId::from_bytes(bytes)
    }
}

impl ObjectId {
    /// Invert `TaskId::return_object`: the task that produces this object.
    pub fn producing_task(&self) -> TaskId {
        let mut bytes = *self.as_bytes();
        for byte in &mut bytes[ID_SIZE - INDEX_SUFFIX..] {
            *byte = 0;
        }
        TaskId::from_bytes(bytes)
    }
}

impl SchedulerId {
    /// Stable identity of a scheduler instance, derived from its node
    /// address and listening socket.
    pub fn for_node(node_ip: &str, socket: &Path) -> SchedulerId {
        let mut content = Vec::new();
        content.extend_from_slice(node_ip.as_bytes());
        content.push(0);
        content.extend_from_slice(socket.to_string_lossy().as_bytes());
        SchedulerId::from_bytes(digest_id(&content))
    }
}

fn encode_len(len: usize) -> [u8; 8] {
    let mut buf = [0u8; 8];
    LittleEndian::write_u64(&mut buf, len as u64);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> ObjectId {
        ObjectId::from_bytes([n; ID_SIZE])
    }

    #[test]
    fn task_id_is_deterministic() {
        let a = TaskId::derive(b"payload", &[oid(1), oid(2)], 2, None);
        let b = TaskId::derive(b"payload", &[oid(1), oid(2)], 2, None);
        assert_eq!(a, b);
    }

    #[test]
    fn task_id_depends_on_content() {
        let base = TaskId::derive(b"payload", &[oid(1)], 1, None);
        assert_ne!(base, TaskId::derive(b"payloae", &[oid(1)], 1, None));
        assert_ne!(base, TaskId::derive(b"payload", &[oid(2)], 1, None));
        assert_ne!(base, TaskId::derive(b"payload", &[oid(1)], 2, None));
        let actor = ActorId::from_bytes([7; ID_SIZE]);
        assert_ne!(base, TaskId::derive(b"payload", &[oid(1)], 1, Some(&actor)));
    }

    #[test]
    fn return_objects_invert_to_producer() {
        let task = TaskId::derive(b"job", &[], 3, None);
        for index in 0..3 {
            let object = task.return_object(index);
            assert_eq!(object.producing_task(), task);
        }
        assert_ne!(task.return_object(0), task.return_object(1));
    }

    #[test]
    fn display_is_short_hex() {
        let id = ObjectId::from_bytes([0xab; ID_SIZE]);
        assert_eq!(format!("{}", id), "abababababababab");
    }
}
