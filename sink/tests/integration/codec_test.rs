use std::sync::Arc;

use chrono::DateTime;
use config::shared::{CodecConfig, UuidStrategy};
use sink::codec::CodecFactory;
use sink::conversions::ConversionContext;
use sink::conversions::time_uuid;
use sink::error::{ErrorCategory, ErrorKind};
use sink::types::{Cell, ColumnType, ExternalShape, ExternalValue, IntegerType};

fn factory(config: CodecConfig) -> CodecFactory {
    let context = ConversionContext::from_config(&config).unwrap();
    CodecFactory::new(Arc::new(context))
}

#[test]
fn text_values_survive_a_round_trip() {
    let factory = factory(CodecConfig::default());

    for (column_type, text) in [
        (ColumnType::Integer(IntegerType::TINYINT), "127"),
        (ColumnType::Integer(IntegerType::TINYINT), "-128"),
        (ColumnType::Integer(IntegerType::BIGINT), "9223372036854775807"),
        (ColumnType::VarInt, "123456789012345678901234567890"),
        (ColumnType::Decimal, "12.5"),
        (ColumnType::Text, "héllo"),
        (ColumnType::Inet, "10.0.0.1"),
        (ColumnType::Uuid, "a9c6f9b4-6f6e-4d0e-9bb5-2f1f5a0d7c11"),
        (ColumnType::Timestamp, "2017-12-05T11:44:36Z"),
        (ColumnType::Date, "2020-02-29"),
        (ColumnType::list(ColumnType::Integer(IntegerType::INT)), "[1,2,3]"),
    ] {
        let codec = factory.codec_for(&ExternalShape::Text, &column_type).unwrap();
        let cell = codec
            .external_to_internal(&ExternalValue::text(text))
            .unwrap();
        let back = codec.internal_to_external(&cell).unwrap();

        assert_eq!(back, ExternalValue::text(text), "{column_type}");
    }
}

#[test]
fn null_tokens_convert_both_ways() {
    let factory = factory(CodecConfig {
        null_strings: vec!["NULL".to_string(), "n/a".to_string()],
        ..CodecConfig::default()
    });

    for column_type in [
        ColumnType::Integer(IntegerType::INT),
        ColumnType::Text,
        ColumnType::Timestamp,
        ColumnType::list(ColumnType::Text),
    ] {
        let codec = factory.codec_for(&ExternalShape::Text, &column_type).unwrap();
        for token in ["NULL", "null", "N/A"] {
            assert_eq!(
                codec.external_to_internal(&ExternalValue::text(token)).unwrap(),
                Cell::Null,
                "{column_type} {token}"
            );
        }
        assert_eq!(
            codec.internal_to_external(&Cell::Null).unwrap(),
            ExternalValue::text("NULL")
        );
    }
}

#[test]
fn fixed_width_integers_never_wrap() {
    let factory = factory(CodecConfig::default());
    let codec = factory
        .codec_for(&ExternalShape::Text, &ColumnType::Integer(IntegerType::TINYINT))
        .unwrap();

    for text in ["128", "-129"] {
        let err = codec
            .external_to_internal(&ExternalValue::text(text))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Conversion, "{text}");
    }
    assert_eq!(
        codec.external_to_internal(&ExternalValue::text("-128")).unwrap(),
        Cell::I8(-128)
    );
}

#[test]
fn huge_exponents_fail_without_expanding_the_number() {
    let factory = factory(CodecConfig::default());

    for column_type in [
        ColumnType::Integer(IntegerType::TINYINT),
        ColumnType::VarInt,
        ColumnType::Decimal,
        ColumnType::Double,
    ] {
        let codec = factory.codec_for(&ExternalShape::Text, &column_type).unwrap();
        for text in ["1e20000000", "-1E-20000000"] {
            let err = codec
                .external_to_internal(&ExternalValue::text(text))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValueOutOfRange, "{column_type} {text}");
        }
    }
}

#[test]
fn uuid_strategies_bracket_the_instant() {
    let instant = "2017-12-05T12:44:36+01:00";
    let millis = DateTime::parse_from_rfc3339(instant)
        .unwrap()
        .timestamp_millis();

    for (strategy, expected) in [
        (UuidStrategy::Min, time_uuid::start_of(millis).unwrap()),
        (UuidStrategy::Max, time_uuid::end_of(millis).unwrap()),
    ] {
        let factory = factory(CodecConfig {
            uuid_strategy: strategy,
            ..CodecConfig::default()
        });
        let codec = factory
            .codec_for(&ExternalShape::Text, &ColumnType::TimeUuid)
            .unwrap();

        assert_eq!(
            codec.external_to_internal(&ExternalValue::text(instant)).unwrap(),
            Cell::Uuid(expected),
            "{strategy:?}"
        );
    }
}
