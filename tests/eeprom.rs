mod common;

mod eeprom {
    use crate::common;
    use ergo_core::eeprom::{ByteStore, WriteStatistics};
    use ergo_core::error::Error;
    use pretty_assertions::assert_eq;

    fn store() -> ByteStore<common::Eeprom> {
        ByteStore::new(common::Eeprom::new(16))
    }

    #[test]
    fn write_unchanged_value_is_skipped() {
        let mut store = store();

        store.write(3, 0x42).unwrap();
        store.write(3, 0x42).unwrap();
        store.write(3, 0x42).unwrap();

        assert_eq!(store.read(3).unwrap(), 0x42);
        assert_eq!(store.hal().writes(), 1);
        assert_eq!(
            store.statistics(),
            WriteStatistics {
                written: 1,
                erased: 0,
                skipped: 2,
            }
        );
    }

    #[test]
    fn write_erased_value_clears_the_cell() {
        let mut store = store();

        // already erased
        store.write(5, 0xFF).unwrap();
        assert_eq!(store.hal().erases(), 0);

        store.write(5, 0x10).unwrap();
        store.write(5, 0xFF).unwrap();

        assert_eq!(store.read(5).unwrap(), 0xFF);
        assert_eq!(store.hal().writes(), 1);
        assert_eq!(store.hal().erases(), 1);
    }

    #[test]
    fn write_slice() {
        let mut store = store();

        store.write_slice(4, &[1, 2, 3, 4]).unwrap();

        let mut buf = [0u8; 6];
        store.read_slice(3, &mut buf).unwrap();
        assert_eq!(buf, [0xFF, 1, 2, 3, 4, 0xFF]);
    }

    #[test]
    fn copy_overlapping_forward() {
        let mut store = store();
        store.write_slice(0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

        store.copy(2, 0, 6).unwrap();

        assert_eq!(&store.hal().buf[..8], &[1, 2, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn copy_overlapping_backward() {
        let mut store = store();
        store.write_slice(0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

        store.copy(0, 2, 6).unwrap();

        assert_eq!(&store.hal().buf[..8], &[3, 4, 5, 6, 7, 8, 7, 8]);
    }

    #[test]
    fn copy_onto_itself_does_nothing() {
        let mut store = store();
        store.write_slice(0, &[1, 2, 3, 4]).unwrap();
        store.hal_mut().operations.clear();

        store.copy(0, 0, 4).unwrap();
        store.copy(4, 0, 0).unwrap();

        assert_eq!(store.hal().operations.len(), 0);
    }

    #[test]
    fn out_of_range() {
        let mut store = store();

        assert_eq!(store.capacity(), 16);
        assert_eq!(store.read(16), Err(Error::InvalidAddress));
        assert_eq!(store.write(u32::MAX, 0), Err(Error::InvalidAddress));
        assert_eq!(
            store.write_slice(14, &[1, 2, 3]),
            Err(Error::InvalidAddress)
        );
        assert_eq!(store.copy(10, 0, 8), Err(Error::InvalidAddress));

        // nothing reached the device
        assert_eq!(store.hal().operations.len(), 0);
    }

    #[test]
    fn platform_error() {
        let mut store = ByteStore::new(common::Eeprom::new_with_fault(16, 0));

        assert_eq!(store.read(0), Err(Error::EepromError));
        assert_eq!(store.write(0, 1), Err(Error::EepromError));
    }
}
