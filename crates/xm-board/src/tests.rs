//! Unit tests for xm-board.

#[cfg(test)]
fn manager_with_m() -> std::sync::Arc<crate::BoardManager> {
    use xm_core::ScalarType;

    let mut bm = crate::BoardManager::new();
    bm.register_message("m").unwrap();
    bm.declare_var("m", "v", ScalarType::Int).unwrap();
    bm.declare_var("m", "w", ScalarType::Double).unwrap();
    std::sync::Arc::new(bm)
}

#[cfg(test)]
mod board {
    use xm_core::ScalarType;

    use super::manager_with_m;
    use crate::{BoardError, BoardManager};

    #[test]
    fn duplicate_message_rejected() {
        let mut bm = BoardManager::new();
        bm.register_message("m").unwrap();
        assert!(matches!(
            bm.register_message("m"),
            Err(BoardError::DuplicateName(_))
        ));
    }

    #[test]
    fn unknown_message_on_every_lookup() {
        let bm = BoardManager::new();
        assert!(matches!(bm.writer("m"), Err(BoardError::UnknownMessage(_))));
        assert!(matches!(bm.iterator("m"), Err(BoardError::UnknownMessage(_))));
        assert!(matches!(bm.sync("m"), Err(BoardError::UnknownMessage(_))));
        assert!(matches!(bm.clear("m"), Err(BoardError::UnknownMessage(_))));
        assert!(matches!(
            bm.committed_count("m"),
            Err(BoardError::UnknownMessage(_))
        ));
        assert!(!bm.exists("m"));
    }

    #[test]
    fn declare_after_writer_rejected() {
        let bm = manager_with_m();
        let _w = bm.writer("m").unwrap();
        // The board is shared and finalized; late declaration must fail.
        let board = bm.board("m").unwrap();
        assert!(board.is_finalized());
    }

    #[test]
    fn declare_var_on_fresh_board() {
        let mut bm = BoardManager::new();
        bm.register_message("m").unwrap();
        bm.declare_var("m", "v", ScalarType::Int).unwrap();
        assert!(matches!(
            bm.declare_var("m", "v", ScalarType::Int),
            Err(BoardError::DuplicateName(_))
        ));
    }

    #[test]
    fn sync_promotes_all_writers() {
        let bm = manager_with_m();
        for k in 0..3i64 {
            let w = bm.writer("m").unwrap();
            let mut msg = w.new_message();
            msg.set::<i64>("v", k).unwrap();
            msg.set::<f64>("w", k as f64).unwrap();
            msg.post().unwrap();
        }
        assert_eq!(bm.committed_count("m").unwrap(), 0);
        bm.sync("m").unwrap();
        assert_eq!(bm.committed_count("m").unwrap(), 3);
    }

    #[test]
    fn sync_is_idempotent() {
        let bm = manager_with_m();
        let w = bm.writer("m").unwrap();
        let mut msg = w.new_message();
        msg.set::<i64>("v", 1).unwrap();
        msg.set::<f64>("w", 1.0).unwrap();
        msg.post().unwrap();

        bm.sync("m").unwrap();
        let after_first = bm.committed_count("m").unwrap();
        bm.sync("m").unwrap();
        assert_eq!(bm.committed_count("m").unwrap(), after_first);
    }

    #[test]
    fn sync_appends_to_previous_committed() {
        let bm = manager_with_m();
        for round in 0..2 {
            let w = bm.writer("m").unwrap();
            let mut msg = w.new_message();
            msg.set::<i64>("v", round).unwrap();
            msg.set::<f64>("w", 0.0).unwrap();
            msg.post().unwrap();
            bm.sync("m").unwrap();
        }
        // Committed = previous committed + writer counts.
        assert_eq!(bm.committed_count("m").unwrap(), 2);
    }

    #[test]
    fn clear_empties_and_is_noop_when_empty() {
        let bm = manager_with_m();
        let w = bm.writer("m").unwrap();
        let mut msg = w.new_message();
        msg.set::<i64>("v", 5).unwrap();
        msg.set::<f64>("w", 5.0).unwrap();
        msg.post().unwrap();
        bm.sync("m").unwrap();

        bm.clear("m").unwrap();
        assert_eq!(bm.committed_count("m").unwrap(), 0);
        bm.clear("m").unwrap(); // no-op on empty board
        assert_eq!(bm.committed_count("m").unwrap(), 0);
    }

    #[test]
    fn writer_disconnected_after_sync() {
        let bm = manager_with_m();
        let w = bm.writer("m").unwrap();
        assert!(w.is_connected());
        bm.sync("m").unwrap();
        assert!(!w.is_connected());
    }
}

#[cfg(test)]
mod writer {
    use super::manager_with_m;
    use crate::{BoardError, BoardManager};

    #[test]
    fn set_checks_name_and_type() {
        let bm = manager_with_m();
        let w = bm.writer("m").unwrap();
        let mut msg = w.new_message();
        assert!(matches!(
            msg.set::<i64>("ghost", 1),
            Err(BoardError::InvalidVariable { .. })
        ));
        assert!(matches!(
            msg.set::<f64>("v", 1.0),
            Err(BoardError::InvalidType { .. })
        ));
    }

    #[test]
    #[cfg(debug_assertions)]
    fn post_with_unset_variable_fails() {
        let bm = manager_with_m();
        let w = bm.writer("m").unwrap();
        let mut msg = w.new_message();
        msg.set::<i64>("v", 1).unwrap();
        // "w" left unset.
        assert!(matches!(
            msg.post(),
            Err(BoardError::InsufficientData { .. })
        ));
    }

    #[test]
    fn post_on_variable_free_board_succeeds() {
        let mut bm = BoardManager::new();
        bm.register_message("ping").unwrap();
        let bm = std::sync::Arc::new(bm);
        let w = bm.writer("ping").unwrap();
        let mut msg = w.new_message();
        msg.post().unwrap();
        msg.post().unwrap();
        assert_eq!(w.count(), 2);
        bm.sync("ping").unwrap();
        assert_eq!(bm.committed_count("ping").unwrap(), 2);
    }

    #[test]
    fn handle_reuse_posts_multiple_messages() {
        let bm = manager_with_m();
        let w = bm.writer("m").unwrap();
        let mut msg = w.new_message();
        for k in 0..4i64 {
            msg.set::<i64>("v", k).unwrap();
            msg.set::<f64>("w", 0.5).unwrap();
            msg.post().unwrap();
        }
        assert_eq!(w.count(), 4);
    }
}

#[cfg(test)]
mod iterator {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use xm_core::ScalarValue;

    use super::manager_with_m;
    use crate::BoardError;

    fn loaded(n: i64) -> std::sync::Arc<crate::BoardManager> {
        let bm = manager_with_m();
        let w = bm.writer("m").unwrap();
        let mut msg = w.new_message();
        for k in 0..n {
            msg.set::<i64>("v", k).unwrap();
            msg.set::<f64>("w", k as f64 * 0.5).unwrap();
            msg.post().unwrap();
        }
        bm.sync("m").unwrap();
        bm
    }

    #[test]
    fn raw_iteration_in_post_order() {
        let bm = loaded(5);
        let mut it = bm.iterator("m").unwrap();
        assert_eq!(it.count(), 5);
        let mut seen = Vec::new();
        while !it.at_end() {
            seen.push(it.get::<i64>("v").unwrap());
            it.next();
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn get_checks_name_type_and_end() {
        let bm = loaded(1);
        let mut it = bm.iterator("m").unwrap();
        assert!(matches!(
            it.get::<i64>("ghost"),
            Err(BoardError::InvalidVariable { .. })
        ));
        assert!(matches!(
            it.get::<f64>("v"),
            Err(BoardError::InvalidType { .. })
        ));
        it.next();
        assert!(it.at_end());
        assert!(matches!(it.get::<i64>("v"), Err(BoardError::OutOfRange)));
    }

    #[test]
    fn rewind_restarts() {
        let bm = loaded(3);
        let mut it = bm.iterator("m").unwrap();
        it.next();
        it.next();
        it.rewind();
        assert_eq!(it.get::<i64>("v").unwrap(), 0);
    }

    #[test]
    fn current_message_copies_the_row() {
        let bm = loaded(2);
        let mut it = bm.iterator("m").unwrap();
        it.next();
        let view = it.current_message().unwrap();
        assert_eq!(view.get("v"), Some(ScalarValue::Int(1)));
        assert_eq!(view.get("w"), Some(ScalarValue::Double(0.5)));
        assert_eq!(view.get("ghost"), None);
    }

    #[test]
    fn randomise_permutes_without_loss() {
        let bm = loaded(10);
        let mut it = bm.iterator("m").unwrap();
        let mut rng = SmallRng::seed_from_u64(7);
        it.randomise(&mut rng);
        let mut seen = Vec::new();
        while !it.at_end() {
            seen.push(it.get::<i64>("v").unwrap());
            it.next();
        }
        let mut sorted = seen.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn retain_subsets_the_iteration() {
        let bm = loaded(6);
        let mut it = bm.iterator("m").unwrap();
        it.retain(|view| matches!(view.get("v"), Some(ScalarValue::Int(v)) if v % 2 == 0))
            .unwrap();
        assert_eq!(it.count(), 3);
        let mut seen = Vec::new();
        while !it.at_end() {
            seen.push(it.get::<i64>("v").unwrap());
            it.next();
        }
        assert_eq!(seen, vec![0, 2, 4]);
    }

    #[test]
    fn sort_by_var_orders_ascending() {
        let bm = loaded(4);
        let mut it = bm.iterator("m").unwrap();
        let mut rng = SmallRng::seed_from_u64(3);
        it.randomise(&mut rng);
        it.sort_by_var("v").unwrap();
        let mut seen = Vec::new();
        while !it.at_end() {
            seen.push(it.get::<i64>("v").unwrap());
            it.next();
        }
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn empty_board_iterator_is_at_end() {
        let bm = manager_with_m();
        let it = bm.iterator("m").unwrap();
        assert!(it.at_end());
        assert_eq!(it.count(), 0);
    }
}

#[cfg(test)]
mod proxy {
    use super::manager_with_m;
    use crate::{BoardError, Proxy};

    #[test]
    fn read_post_sets_are_disjoint() {
        let mut p = Proxy::new();
        p.allow_read("m").unwrap();
        assert!(matches!(
            p.allow_post("m"),
            Err(BoardError::ReadPostConflict(_))
        ));
        let mut q = Proxy::new();
        q.allow_post("m").unwrap();
        assert!(matches!(
            q.allow_read("m"),
            Err(BoardError::ReadPostConflict(_))
        ));
    }

    #[test]
    fn client_enforces_capabilities() {
        let bm = manager_with_m();
        let mut p = Proxy::new();
        p.allow_read("m").unwrap();
        let mut client = p.client(bm);
        assert!(client.get_messages("m").is_ok());
        assert!(matches!(
            client.get_writer("m"),
            Err(BoardError::NoPostAccess(_))
        ));
        assert!(matches!(
            client.get_messages("other"),
            Err(BoardError::NoReadAccess(_))
        ));
    }

    #[test]
    fn client_writer_is_cached_and_reacquired_after_sync() {
        let bm = manager_with_m();
        let mut p = Proxy::new();
        p.allow_post("m").unwrap();
        let mut client = p.client(bm.clone());

        let first = std::sync::Arc::as_ptr(client.get_writer("m").unwrap());
        let again = std::sync::Arc::as_ptr(client.get_writer("m").unwrap());
        assert_eq!(first, again, "writer should be cached");

        bm.sync("m").unwrap(); // disconnects the cached writer
        let fresh = std::sync::Arc::as_ptr(client.get_writer("m").unwrap());
        assert_ne!(first, fresh, "stale writer should be re-acquired");
    }

    #[test]
    fn writer_isolation_until_sync() {
        let bm = manager_with_m();
        let mut p = Proxy::new();
        p.allow_post("m").unwrap();
        let mut c1 = p.client(bm.clone());
        let mut c2 = p.client(bm.clone());

        let mut msg = c1.new_message("m").unwrap();
        msg.set::<i64>("v", 1).unwrap();
        msg.set::<f64>("w", 1.0).unwrap();
        msg.post().unwrap();
        drop(msg);

        // c2's posts are invisible to any reader until a sync runs; so are c1's.
        let mut reader = Proxy::new();
        reader.allow_read("m").unwrap();
        let rc = reader.client(bm.clone());
        assert_eq!(rc.committed_count("m").unwrap(), 0);

        let mut msg2 = c2.new_message("m").unwrap();
        msg2.set::<i64>("v", 2).unwrap();
        msg2.set::<f64>("w", 2.0).unwrap();
        msg2.post().unwrap();
        drop(msg2);

        bm.sync("m").unwrap();
        assert_eq!(rc.committed_count("m").unwrap(), 2);
    }
}
