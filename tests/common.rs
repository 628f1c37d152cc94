#![allow(dead_code)]

// filename according to https://doc.rust-lang.org/book/ch11-03-test-organization.html
use embedded_storage::{ReadStorage, Storage};
use ergo_core::platform::ByteErase;
use ergo_core::{Action, Geometry, KeyDispatch, Keyboard, Uid};

// ATmega32U4
pub const EEPROM_SIZE: usize = 1024;

#[derive(Default, Clone)]
pub struct Eeprom {
    pub buf: Vec<u8>,
    pub fail_after_operation: usize,
    pub operations: Vec<Operation>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Operation {
    Read { offset: u32, len: usize },
    Write { offset: u32, len: usize },
    Erase { offset: u32 },
}

impl Eeprom {
    pub fn new(size: usize) -> Self {
        Self {
            buf: vec![0xffu8; size],
            fail_after_operation: usize::MAX,
            ..Default::default()
        }
    }

    pub fn new_with_fault(size: usize, fail_after_operation: usize) -> Self {
        Self {
            buf: vec![0xffu8; size],
            fail_after_operation,
            ..Default::default()
        }
    }

    /// Same content, fresh operation log, no faults.
    pub fn from_image(buf: &[u8]) -> Self {
        Self {
            buf: buf.to_vec(),
            fail_after_operation: usize::MAX,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn disable_faults(&mut self) {
        self.fail_after_operation = usize::MAX;
    }

    pub fn writes(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Write { .. }))
            .count()
    }

    pub fn erases(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Erase { .. }))
            .count()
    }

    pub fn dump_operations(&self) {
        println!("Operations:");
        for op in &self.operations {
            println!("  {:?}", op);
        }
    }

    fn fault(&self) -> bool {
        if self.operations.len() >= self.fail_after_operation {
            println!("    eeprom: FAULT");
            return true;
        }
        false
    }
}

#[derive(Debug)]
pub struct EepromError;

impl ReadStorage for Eeprom {
    type Error = EepromError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        println!(
            "    eeprom: read:  0x{offset:04X}[0x{:04X}] #{:>2}",
            bytes.len(),
            self.operations.len()
        );
        if self.fault() {
            return Err(EepromError);
        }
        self.operations.push(Operation::Read {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        bytes.copy_from_slice(&self.buf[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl Storage for Eeprom {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        println!(
            "    eeprom: write: 0x{offset:04X}[0x{:04X}] #{:>2}",
            bytes.len(),
            self.operations.len()
        );
        if self.fault() {
            return Err(EepromError);
        }
        assert!(!bytes.is_empty());

        self.operations.push(Operation::Write {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        self.buf[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

impl ByteErase for Eeprom {
    fn erase_byte(&mut self, offset: u32) -> Result<(), Self::Error> {
        println!(
            "    eeprom: erase: 0x{offset:04X} #{:>2}",
            self.operations.len()
        );
        if self.fault() {
            return Err(EepromError);
        }
        self.operations.push(Operation::Erase { offset });

        self.buf[offset as usize] = 0xff;
        Ok(())
    }
}

pub fn keyboard() -> Keyboard<Eeprom> {
    Keyboard::new(Eeprom::new(EEPROM_SIZE), Geometry::ERGODOX).unwrap()
}

/// Key dispatch that logs every action it gets. A press on a key with a macro bound on the
/// current layer plays that macro, like the real firmware does.
#[derive(Default)]
pub struct Recorder {
    pub executed: Vec<Action>,
    pub play_macros: bool,
}

impl Recorder {
    pub fn playing() -> Self {
        Self {
            play_macros: true,
            ..Default::default()
        }
    }
}

impl KeyDispatch<Eeprom> for Recorder {
    fn exec_key(
        &mut self,
        keyboard: &mut Keyboard<Eeprom>,
        action: Action,
    ) -> Result<(), ergo_core::error::Error> {
        self.executed.push(action);

        if self.play_macros && action.pressed {
            let uid = Uid::new(action.row, action.column, keyboard.current_layer());
            if keyboard.macros_mut().exists(uid)? {
                keyboard.play(uid, &mut *self)?;
            }
        }
        Ok(())
    }
}
