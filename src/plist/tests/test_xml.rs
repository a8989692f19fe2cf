#[cfg(test)]
mod xml_tests {
    use chrono::DateTime;

    use crate::{
        error::plist::PlistError,
        plist::{
            models::{Dictionary, Node},
            xml::XmlPlistReader,
        },
    };

    fn parse(text: &str) -> Result<Node, PlistError> {
        XmlPlistReader::from(text.as_bytes())?.parse()
    }

    #[test]
    fn test_parse_basic_dict() {
        let result =
            parse("<plist><dict><key>k</key><integer>42</integer></dict></plist>").unwrap();

        let mut expected = Dictionary::new();
        expected.insert("k".to_string(), Node::integer(42));
        assert_eq!(result, Node::Dictionary(expected));
    }

    #[test]
    fn can_parse_every_value_type() {
        let result = parse(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>text</key>
    <string>Hello</string>
    <key>count</key>
    <integer>-7</integer>
    <key>ratio</key>
    <real>0.25</real>
    <key>yes</key>
    <true/>
    <key>no</key>
    <false/>
    <key>when</key>
    <date>2023-05-01T12:30:00Z</date>
    <key>blob</key>
    <data>SGVsbG8=</data>
    <key>items</key>
    <array>
        <integer>1</integer>
        <string>two</string>
    </array>
    <key>nested</key>
    <dict>
        <key>inner</key>
        <string>value</string>
    </dict>
</dict>
</plist>"#,
        )
        .unwrap();

        let mut nested = Dictionary::new();
        nested.insert("inner".to_string(), Node::string("value"));

        let mut expected = Dictionary::new();
        expected.insert("text".to_string(), Node::string("Hello"));
        expected.insert("count".to_string(), Node::integer(-7));
        expected.insert("ratio".to_string(), Node::real(0.25));
        expected.insert("yes".to_string(), Node::Boolean(true));
        expected.insert("no".to_string(), Node::Boolean(false));
        expected.insert(
            "when".to_string(),
            Node::Date(DateTime::from_timestamp(1_682_944_200, 0).unwrap()),
        );
        expected.insert("blob".to_string(), Node::Data(b"Hello".to_vec()));
        expected.insert(
            "items".to_string(),
            Node::Array(vec![Node::integer(1), Node::string("two")]),
        );
        expected.insert("nested".to_string(), Node::Dictionary(nested));

        assert_eq!(result, Node::Dictionary(expected));
    }

    #[test]
    fn can_parse_empty_containers() {
        assert_eq!(
            parse("<plist><dict/></plist>").unwrap(),
            Node::Dictionary(Dictionary::new())
        );
        assert_eq!(parse("<plist><array/></plist>").unwrap(), Node::Array(vec![]));
        assert_eq!(parse("<plist><string/></plist>").unwrap(), Node::string(""));
        assert_eq!(
            parse("<plist><string></string></plist>").unwrap(),
            Node::string("")
        );
        assert_eq!(parse("<plist><data/></plist>").unwrap(), Node::Data(vec![]));
    }

    #[test]
    fn can_parse_explicitly_closed_booleans() {
        assert_eq!(
            parse("<plist><true></true></plist>").unwrap(),
            Node::Boolean(true)
        );
    }

    #[test]
    fn can_decode_entities() {
        assert_eq!(
            parse("<plist><string>&lt;a&gt; &amp; &#65;&#x42;</string></plist>").unwrap(),
            Node::string("<a> & AB")
        );
    }

    #[test]
    fn can_decode_cdata() {
        assert_eq!(
            parse("<plist><string><![CDATA[a & b]]></string></plist>").unwrap(),
            Node::string("a & b")
        );
    }

    #[test]
    fn can_parse_data_with_whitespace() {
        assert_eq!(
            parse("<plist><data>\n    SGVs\n    bG8=\n</data></plist>").unwrap(),
            Node::Data(b"Hello".to_vec())
        );
    }

    #[test]
    fn can_normalize_date_offsets_to_utc() {
        let result = parse("<plist><date>2023-05-01T14:30:00+02:00</date></plist>").unwrap();
        assert_eq!(
            result,
            Node::Date(DateTime::from_timestamp(1_682_944_200, 0).unwrap())
        );
    }

    #[test]
    fn can_tolerate_byte_order_mark() {
        let text = "\u{feff}<plist><integer>1</integer></plist>";
        assert_eq!(parse(text).unwrap(), Node::integer(1));
    }

    #[test]
    fn preserves_key_order() {
        let result = parse(
            "<plist><dict>\
             <key>zulu</key><integer>1</integer>\
             <key>alpha</key><integer>2</integer>\
             <key>mike</key><integer>3</integer>\
             </dict></plist>",
        )
        .unwrap();

        let keys: Vec<&String> = result.as_dict().unwrap().keys().collect();
        assert_eq!(keys, ["zulu", "alpha", "mike"]);
    }

    #[test]
    fn doesnt_parse_key_without_value() {
        let result = parse("<plist><dict><key>k</key></dict></plist>");
        assert!(matches!(result, Err(PlistError::MalformedFormat(_))));
    }

    #[test]
    fn doesnt_parse_value_without_key() {
        let result = parse("<plist><dict><integer>1</integer></dict></plist>");
        assert!(matches!(result, Err(PlistError::MalformedFormat(_))));
    }

    #[test]
    fn doesnt_parse_empty_key() {
        let result = parse("<plist><dict><key></key><integer>1</integer></dict></plist>");
        assert!(matches!(result, Err(PlistError::MalformedFormat(_))));
    }

    #[test]
    fn doesnt_parse_duplicate_key() {
        let result = parse(
            "<plist><dict>\
             <key>k</key><integer>1</integer>\
             <key>k</key><integer>2</integer>\
             </dict></plist>",
        );
        assert!(matches!(result, Err(PlistError::MalformedFormat(_))));
    }

    #[test]
    fn doesnt_parse_unrecognized_element() {
        let result = parse("<plist><widget/></plist>");
        assert!(matches!(result, Err(PlistError::MalformedFormat(_))));
    }

    #[test]
    fn doesnt_parse_bad_base64() {
        let result = parse("<plist><data>not base64!</data></plist>");
        assert!(matches!(result, Err(PlistError::MalformedFormat(_))));
    }

    #[test]
    fn doesnt_parse_bad_date() {
        let result = parse("<plist><date>yesterday</date></plist>");
        assert!(matches!(result, Err(PlistError::MalformedFormat(_))));
    }

    #[test]
    fn doesnt_parse_bad_integer() {
        let result = parse("<plist><integer>4x</integer></plist>");
        assert!(matches!(result, Err(PlistError::MalformedFormat(_))));
    }

    #[test]
    fn doesnt_parse_missing_plist_root() {
        let result = parse("<dict><key>k</key><integer>1</integer></dict>");
        assert!(matches!(result, Err(PlistError::MalformedFormat(_))));
    }

    #[test]
    fn doesnt_parse_unterminated_document() {
        let result = parse("<plist><dict><key>k</key><integer>1</integer>");
        assert!(matches!(result, Err(PlistError::MalformedFormat(_))));
    }

    #[test]
    fn doesnt_parse_trailing_content() {
        let result = parse("<plist><true/></plist><true/>");
        assert!(matches!(result, Err(PlistError::MalformedFormat(_))));
    }

    #[test]
    fn doesnt_parse_two_children_under_plist() {
        let result = parse("<plist><true/><false/></plist>");
        assert!(matches!(result, Err(PlistError::MalformedFormat(_))));
    }
}
