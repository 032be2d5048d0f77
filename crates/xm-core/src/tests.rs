//! Unit tests for xm-core.

#[cfg(test)]
mod ids {
    use crate::{QueueId, TaskId};

    #[test]
    fn term_sentinel() {
        assert!(TaskId::TERM.is_term());
        assert!(!TaskId(0).is_term());
        assert_eq!(TaskId::TERM, TaskId(u64::MAX));
    }

    #[test]
    fn ids_are_arena_indices() {
        assert_eq!(TaskId(42).index(), 42);
        assert_eq!(QueueId(3).index(), 3);
    }

    #[test]
    fn display_forms() {
        assert_eq!(TaskId(7).to_string(), "#7");
        assert_eq!(QueueId(1).to_string(), "1");
    }
}

#[cfg(test)]
mod value {
    use crate::{Scalar, ScalarType, ScalarValue};

    #[test]
    fn parse_type_names() {
        assert_eq!(ScalarType::parse("int"), Some(ScalarType::Int));
        assert_eq!(ScalarType::parse("double"), Some(ScalarType::Double));
        assert_eq!(ScalarType::parse("float"), None);
    }

    #[test]
    fn parse_as_int() {
        let v = ScalarValue::parse_as(" 17 ", ScalarType::Int).unwrap();
        assert_eq!(v, ScalarValue::Int(17));
    }

    #[test]
    fn parse_as_int_rejects_text() {
        let err = ScalarValue::parse_as("abc", ScalarType::Int).unwrap_err();
        assert_eq!(err.expected, ScalarType::Int);
        assert_eq!(err.value, "abc");
    }

    #[test]
    fn parse_as_double_accepts_int_literal() {
        let v = ScalarValue::parse_as("3", ScalarType::Double).unwrap();
        assert_eq!(v, ScalarValue::Double(3.0));
    }

    #[test]
    fn scalar_trait_round_trip() {
        assert_eq!(i64::from_value(ScalarValue::Int(5)), Some(5));
        assert_eq!(i64::from_value(ScalarValue::Double(5.0)), None);
        assert_eq!(2.5f64.into_value(), ScalarValue::Double(2.5));
        assert_eq!(<f64 as Scalar>::TYPE, ScalarType::Double);
    }
}

#[cfg(test)]
mod plugin {
    use crate::{ColumnView, ScalarType};

    #[test]
    fn column_view_len_and_type() {
        let ints = [1i64, 2, 3];
        let view = ColumnView::Int(&ints);
        assert_eq!(view.len(), 3);
        assert!(!view.is_empty());
        assert_eq!(view.scalar_type(), ScalarType::Int);
    }
}
