#[cfg(test)]
mod detect_tests {
    use crate::{
        error::plist::PlistError,
        plist::{detect_format, read_plist, read_plist_from_path, PlistFormat},
    };

    #[test]
    fn can_detect_binary() {
        assert_eq!(
            detect_format(b"bplist00after the head anything goes").unwrap(),
            PlistFormat::Binary
        );
    }

    #[test]
    fn can_detect_xml_prolog() {
        assert_eq!(
            detect_format(b"<?xml version=\"1.0\"?>").unwrap(),
            PlistFormat::Xml
        );
        assert_eq!(detect_format(b"<?XML ...").unwrap(), PlistFormat::Xml);
    }

    #[test]
    fn can_detect_doctype() {
        assert_eq!(
            detect_format(b"<!DOCTYPE plist PUBLIC ...").unwrap(),
            PlistFormat::Xml
        );
        assert_eq!(detect_format(b"<!doctype html>").unwrap(), PlistFormat::Xml);
    }

    #[test]
    fn doesnt_detect_arbitrary_xml() {
        assert!(matches!(
            detect_format(b"<not-a-plist/>"),
            Err(PlistError::UnknownFormat)
        ));
    }

    #[test]
    fn doesnt_detect_near_misses() {
        assert!(matches!(
            detect_format(b"bplist01"),
            Err(PlistError::UnknownFormat)
        ));
        assert!(matches!(
            detect_format(b"bplist0"),
            Err(PlistError::UnknownFormat)
        ));
        assert!(matches!(detect_format(b""), Err(PlistError::UnknownFormat)));
        assert!(matches!(
            detect_format(b"{\"json\": true}"),
            Err(PlistError::UnknownFormat)
        ));
    }

    #[test]
    fn read_plist_rejects_unknown_format() {
        assert!(matches!(
            read_plist(b"<not-a-plist/>"),
            Err(PlistError::UnknownFormat)
        ));
    }

    #[test]
    fn read_plist_dispatches_to_xml() {
        let node = read_plist(b"<?xml version=\"1.0\"?><plist><integer>3</integer></plist>")
            .unwrap();
        assert_eq!(node.as_number_i64().unwrap(), 3);
    }

    #[test]
    fn binary_and_xml_produce_equal_trees() {
        // The same logical document in both encodings
        let mut binary = b"bplist00".to_vec();
        binary.extend([0xD1, 0x01, 0x02]); // dict of one entry at offset 8
        binary.extend([0x51, b'k']); // "k" at offset 11
        binary.extend([0x10, 42]); // 42 at offset 13
        binary.extend([8, 11, 13]); // offset table at offset 15
        binary.extend([0, 0, 0, 0, 0, 0, 1, 1]);
        binary.extend(3u64.to_be_bytes());
        binary.extend(0u64.to_be_bytes());
        binary.extend(15u64.to_be_bytes());

        let from_binary = read_plist(&binary).unwrap();
        let from_xml =
            read_plist(b"<?xml version=\"1.0\"?><plist><dict><key>k</key><integer>42</integer></dict></plist>")
                .unwrap();

        assert_eq!(from_binary, from_xml);
    }

    #[test]
    fn read_plist_from_path_surfaces_io_errors() {
        let result = read_plist_from_path("/nonexistent/path/to/archive.plist");
        assert!(matches!(result, Err(PlistError::Io(_))));
    }
}
