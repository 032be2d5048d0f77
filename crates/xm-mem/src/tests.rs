//! Unit tests for xm-mem.

#[cfg(test)]
mod vector {
    use xm_core::{ScalarType, ScalarValue};

    use crate::vector::{TypedVector, VectorStore};

    #[test]
    fn raw_begin_null_when_empty() {
        let v = TypedVector::<i64>::new();
        assert!(v.raw_begin().is_null());
        assert!(v.raw_begin_at(0).is_null());
    }

    #[test]
    fn raw_stepping_visits_every_element() {
        let v = TypedVector::<i64>::from_vec(vec![10, 20, 30]);
        let mut seen = Vec::new();
        let mut p = v.raw_begin();
        while !p.is_null() {
            seen.push(unsafe { *(p as *const i64) });
            p = v.raw_step(p);
        }
        assert_eq!(seen, vec![10, 20, 30]);
    }

    #[test]
    fn raw_begin_at_offsets_into_the_column() {
        let v = TypedVector::<f64>::from_vec(vec![1.0, 2.0, 3.0]);
        let p = v.raw_begin_at(2);
        assert_eq!(unsafe { *(p as *const f64) }, 3.0);
        assert!(v.raw_step(p).is_null());
        assert!(v.raw_begin_at(3).is_null());
    }

    #[test]
    fn extend_from_same_type() {
        let a = TypedVector::<i64>::from_vec(vec![1, 2]);
        let b = TypedVector::<i64>::from_vec(vec![3]);
        a.extend_from(&b).unwrap();
        assert_eq!(a.as_slice(), &[1, 2, 3]);
        // Source is untouched.
        assert_eq!(b.as_slice(), &[3]);
    }

    #[test]
    fn extend_from_rejects_type_mismatch() {
        let a = TypedVector::<i64>::new();
        let b = TypedVector::<f64>::new();
        assert!(a.extend_from(&b).is_err());
    }

    #[test]
    fn clone_empty_is_empty_same_type() {
        let a = TypedVector::<f64>::from_vec(vec![1.5]);
        let e = a.clone_empty();
        assert!(e.is_empty());
        assert_eq!(e.scalar_type(), ScalarType::Double);
    }

    #[test]
    fn truncate_preserves_capacity() {
        let a = TypedVector::<i64>::from_vec(vec![1, 2, 3]);
        a.truncate();
        assert!(a.is_empty());
        a.push(9);
        assert_eq!(a.as_slice(), &[9]);
    }

    #[test]
    fn remove_rows_compacts_in_order() {
        let a = TypedVector::<i64>::from_vec(vec![0, 1, 2, 3, 4, 5]);
        a.remove_rows(&[1, 4]);
        assert_eq!(a.as_slice(), &[0, 2, 3, 5]);
    }

    #[test]
    fn push_value_checks_tag() {
        let a = TypedVector::<i64>::new();
        a.push_value(ScalarValue::Int(7)).unwrap();
        assert!(a.push_value(ScalarValue::Double(1.0)).is_err());
        assert_eq!(a.value_at(0), Some(ScalarValue::Int(7)));
        assert_eq!(a.value_at(1), None);
    }
}

#[cfg(test)]
mod agent_memory {
    use xm_core::ScalarValue;

    use crate::{MemError, MemoryManager};

    fn manager_with_circle() -> MemoryManager {
        let mut mm = MemoryManager::new();
        mm.register_agent("Circle").unwrap();
        mm.register_var::<i64>("Circle", "x_int").unwrap();
        mm.register_var::<f64>("Circle", "y_dbl").unwrap();
        mm
    }

    #[test]
    fn duplicate_agent_rejected() {
        let mut mm = manager_with_circle();
        assert!(matches!(
            mm.register_agent("Circle"),
            Err(MemError::DuplicateName(_))
        ));
    }

    #[test]
    fn duplicate_var_rejected() {
        let mut mm = manager_with_circle();
        assert!(matches!(
            mm.register_var::<i64>("Circle", "x_int"),
            Err(MemError::DuplicateName(_))
        ));
    }

    #[test]
    fn register_after_hint_rejected() {
        let mut mm = manager_with_circle();
        mm.hint_population_size("Circle", 100).unwrap();
        assert!(matches!(
            mm.register_var::<i64>("Circle", "late"),
            Err(MemError::AlreadyFinalized { .. })
        ));
    }

    #[test]
    fn typed_lookup_checks_element_type() {
        let mm = manager_with_circle();
        assert!(mm.vector_of::<i64>("Circle", "x_int").is_ok());
        assert!(matches!(
            mm.vector_of::<f64>("Circle", "x_int"),
            Err(MemError::InvalidType { .. })
        ));
        assert!(matches!(
            mm.vector_of::<i64>("Circle", "nope"),
            Err(MemError::InvalidVariable { .. })
        ));
        assert!(matches!(
            mm.vector_of::<i64>("Square", "x_int"),
            Err(MemError::InvalidAgent(_))
        ));
    }

    #[test]
    fn population_and_schema() {
        let mm = manager_with_circle();
        let am = mm.agent("Circle").unwrap();
        am.append_value("x_int", ScalarValue::Int(1)).unwrap();
        am.append_value("y_dbl", ScalarValue::Double(2.0)).unwrap();
        assert_eq!(mm.population_of("Circle").unwrap(), 1);

        let schema = mm.schema();
        let vars = &schema["Circle"];
        // Declaration order is preserved.
        assert_eq!(vars[0].1, "x_int");
        assert_eq!(vars[1].1, "y_dbl");
    }

    #[test]
    fn column_equality_enforced() {
        let mm = manager_with_circle();
        let am = mm.agent("Circle").unwrap();
        am.append_value("x_int", ScalarValue::Int(1)).unwrap();
        assert!(matches!(
            mm.assert_columns_equal(),
            Err(MemError::SizeMismatch { .. })
        ));
        am.append_value("y_dbl", ScalarValue::Double(0.5)).unwrap();
        assert!(mm.assert_columns_equal().is_ok());
    }

    #[test]
    fn compaction_removes_marked_rows() {
        let mm = manager_with_circle();
        let am = mm.agent("Circle").unwrap();
        for i in 0..4 {
            am.append_value("x_int", ScalarValue::Int(i)).unwrap();
            am.append_value("y_dbl", ScalarValue::Double(i as f64)).unwrap();
        }
        am.mark_dead(1);
        am.mark_dead(3);
        am.mark_dead(3); // idempotent per row
        assert_eq!(am.compact(), 2);
        assert_eq!(am.population(), 2);
        let xs = mm.vector_of::<i64>("Circle", "x_int").unwrap();
        assert_eq!(xs.as_slice(), &[0, 2]);
        // Second compact is a no-op.
        assert_eq!(am.compact(), 0);
    }
}

#[cfg(test)]
mod shadow {
    use xm_core::ScalarValue;

    use crate::{MemError, MemoryManager};

    fn loaded_manager(n: i64) -> MemoryManager {
        let mut mm = MemoryManager::new();
        mm.register_agent("Circle").unwrap();
        mm.register_var::<i64>("Circle", "x_int").unwrap();
        mm.register_var::<f64>("Circle", "y_dbl").unwrap();
        let am = mm.agent("Circle").unwrap();
        for i in 0..n {
            am.append_value("x_int", ScalarValue::Int(i)).unwrap();
            am.append_value("y_dbl", ScalarValue::Double(i as f64 * 2.0))
                .unwrap();
        }
        mm
    }

    #[test]
    fn allow_unknown_var_fails() {
        let mm = loaded_manager(3);
        let mut shadow = mm.make_shadow("Circle").unwrap();
        assert!(matches!(
            shadow.allow("ghost", false),
            Err(MemError::InvalidVariable { .. })
        ));
    }

    #[test]
    fn allow_twice_fails() {
        let mm = loaded_manager(3);
        let mut shadow = mm.make_shadow("Circle").unwrap();
        shadow.allow("x_int", false).unwrap();
        assert!(matches!(
            shadow.allow("x_int", true),
            Err(MemError::DuplicateName(_))
        ));
    }

    #[test]
    fn unequal_columns_fail_size_mismatch() {
        let mm = loaded_manager(2);
        mm.agent("Circle")
            .unwrap()
            .append_value("x_int", ScalarValue::Int(99))
            .unwrap();
        let mut shadow = mm.make_shadow("Circle").unwrap();
        shadow.allow("x_int", false).unwrap();
        assert!(matches!(
            shadow.allow("y_dbl", false),
            Err(MemError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn writability_is_per_variable() {
        let mm = loaded_manager(1);
        let mut shadow = mm.make_shadow("Circle").unwrap();
        shadow.allow("x_int", false).unwrap();
        shadow.allow("y_dbl", true).unwrap();
        assert!(!shadow.is_writable("x_int"));
        assert!(shadow.is_writable("y_dbl"));
    }

    #[test]
    fn iterator_walks_all_rows() {
        let mm = loaded_manager(5);
        let mut shadow = mm.make_shadow("Circle").unwrap();
        shadow.allow("x_int", false).unwrap();
        shadow.allow("y_dbl", false).unwrap();

        let mut it = shadow.iter().unwrap();
        let mut rows = Vec::new();
        while !it.at_end() {
            rows.push((it.get::<i64>("x_int").unwrap(), it.get::<f64>("y_dbl").unwrap()));
            it.step();
        }
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[3], (3, 6.0));
    }

    #[test]
    fn set_requires_write_access() {
        let mm = loaded_manager(2);
        let mut shadow = mm.make_shadow("Circle").unwrap();
        shadow.allow("x_int", false).unwrap();
        shadow.allow("y_dbl", true).unwrap();

        let mut it = shadow.iter().unwrap();
        assert!(matches!(
            it.set::<i64>("x_int", 1),
            Err(MemError::NoWriteAccess(_))
        ));
        it.set::<f64>("y_dbl", 9.5).unwrap();
        assert_eq!(it.get::<f64>("y_dbl").unwrap(), 9.5);
    }

    #[test]
    fn get_checks_type_and_membership() {
        let mm = loaded_manager(1);
        let mut shadow = mm.make_shadow("Circle").unwrap();
        shadow.allow("x_int", false).unwrap();

        let it = shadow.iter().unwrap();
        assert!(matches!(
            it.get::<f64>("x_int"),
            Err(MemError::InvalidType { .. })
        ));
        assert!(matches!(
            it.get::<i64>("y_dbl"),
            Err(MemError::InvalidVariable { .. })
        ));
    }

    #[test]
    fn get_at_end_is_out_of_range() {
        let mm = loaded_manager(1);
        let mut shadow = mm.make_shadow("Circle").unwrap();
        shadow.allow("x_int", false).unwrap();

        let mut it = shadow.iter().unwrap();
        assert!(it.step() || it.at_end());
        assert!(it.at_end());
        assert!(matches!(it.get::<i64>("x_int"), Err(MemError::OutOfRange)));
    }

    #[test]
    fn windowed_iteration_covers_disjoint_rows() {
        let mm = loaded_manager(10);
        let mut shadow = mm.make_shadow("Circle").unwrap();
        shadow.allow("x_int", true).unwrap();

        // Two disjoint windows touch every row exactly once.
        for (offset, count) in [(0usize, 5usize), (5, 5)] {
            let mut it = shadow.iter_window(offset, count).unwrap();
            while !it.at_end() {
                let x = it.get::<i64>("x_int").unwrap();
                it.set::<i64>("x_int", x + 100).unwrap();
                it.step();
            }
        }
        let xs = mm.vector_of::<i64>("Circle", "x_int").unwrap();
        let expect: Vec<i64> = (0..10).map(|i| i + 100).collect();
        assert_eq!(xs.as_slice(), expect.as_slice());
    }

    #[test]
    fn empty_population_iterates_zero_rows() {
        let mm = loaded_manager(0);
        let mut shadow = mm.make_shadow("Circle").unwrap();
        shadow.allow("x_int", false).unwrap();
        let mut it = shadow.iter().unwrap();
        assert!(it.at_end());
        assert!(!it.step());
        assert!(matches!(it.get::<i64>("x_int"), Err(MemError::OutOfRange)));
    }

    #[test]
    fn rewind_restarts_the_window() {
        let mm = loaded_manager(4);
        let mut shadow = mm.make_shadow("Circle").unwrap();
        shadow.allow("x_int", false).unwrap();
        let mut it = shadow.iter_window(2, 2).unwrap();
        assert_eq!(it.get::<i64>("x_int").unwrap(), 2);
        it.step();
        assert_eq!(it.get::<i64>("x_int").unwrap(), 3);
        it.rewind();
        assert_eq!(it.position(), 0);
        assert_eq!(it.get::<i64>("x_int").unwrap(), 2);
    }
}
