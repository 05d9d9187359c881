//! Property tests for building and re-parsing messages.

#![allow(clippy::unwrap_used)]

use chrono::DateTime;
use modmail_mime::{Attachment, Message, MessageBuilder};
use proptest::prelude::*;

fn filename() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9_-]{1,16}\\.(pdf|txt|png)",
        "[a-zA-Z ]{1,8}(é|ü|ß|日本)[a-z]{0,6}\\.doc",
    ]
}

proptest! {
    #[test]
    fn build_then_parse_recovers_fields(
        subject in "\\PC{0,120}",
        body in "\\PC{0,400}",
        names in proptest::collection::vec(filename(), 0..4),
        payload in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        let mut builder = MessageBuilder::new()
            .from("alice@example.com")
            .to("bob@example.com")
            .subject(subject.clone())
            .text_body(body.clone())
            .date(DateTime::parse_from_rfc2822("Wed, 2 Jul 2025 08:30:00 +0200").unwrap());
        for name in &names {
            builder = builder.attach(Attachment::new(name.clone(), payload.clone()));
        }

        let raw = builder.build().unwrap();
        let message = Message::parse(&raw).unwrap();

        prop_assert_eq!(message.subject().unwrap_or_default(), subject);
        prop_assert_eq!(message.body_text().unwrap(), body);
        prop_assert_eq!(message.attachment_filenames(), names);
        for part in message.parts.iter().skip(1) {
            prop_assert_eq!(part.decode_body().unwrap(), payload.clone());
        }
    }

    #[test]
    fn parse_never_panics(raw in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = Message::parse(&raw);
    }

    #[test]
    fn parse_multipart_with_arbitrary_body_never_panics(body in "\\PC{0,300}") {
        let raw = format!(
            "Content-Type: multipart/mixed; boundary=b\r\n\r\n--b\r\n\r\n{body}\r\n--b--\r\n"
        );
        if let Ok(message) = Message::parse(raw.as_bytes()) {
            let _ = message.body_text();
        }
    }
}
