// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Generational arena for per-request engine state.

use crate::engine::RequestId;

#[derive(Debug)]
enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32, next_free: Option<u32> },
}

/// Slots indexed by [`RequestId`].
///
/// Removing an entry bumps its slot's generation, so ids of removed entries
/// never resolve again even after the slot is reused.
#[derive(Debug)]
pub struct TaskTable<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> Default for TaskTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TaskTable<T> {
    pub const fn new() -> Self {
        TaskTable {
            slots: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    pub fn insert(&mut self, value: T) -> RequestId {
        self.len += 1;
        if let Some(index) = self.free_head {
            let slot = &mut self.slots[index as usize];
            let Slot::Vacant {
                generation,
                next_free,
            } = *slot
            else {
                unreachable!("free list points at an occupied slot");
            };
            self.free_head = next_free;
            *slot = Slot::Occupied { generation, value };
            RequestId::new(index, generation)
        } else {
            let index = u32::try_from(self.slots.len()).expect("task table exhausted u32 indices");
            self.slots.push(Slot::Occupied {
                generation: 0,
                value,
            });
            RequestId::new(index, 0)
        }
    }

    pub fn get(&self, id: RequestId) -> Option<&T> {
        match self.slots.get(id.index() as usize)? {
            Slot::Occupied { generation, value } if *generation == id.generation() => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: RequestId) -> Option<&mut T> {
        match self.slots.get_mut(id.index() as usize)? {
            Slot::Occupied { generation, value } if *generation == id.generation() => Some(value),
            _ => None,
        }
    }

    pub fn remove(&mut self, id: RequestId) -> Option<T> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == id.generation() => {}
            _ => return None,
        }
        let vacant = Slot::Vacant {
            generation: id.generation().wrapping_add(1),
            next_free: self.free_head,
        };
        let Slot::Occupied { value, .. } = std::mem::replace(slot, vacant) else {
            unreachable!()
        };
        self.free_head = Some(id.index());
        self.len -= 1;
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
