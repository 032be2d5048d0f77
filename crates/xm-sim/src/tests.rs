//! End-to-end simulation scenarios.

#[cfg(test)]
mod support {
    use xm_board::BoardClient;
    use xm_core::{ScalarType, ScalarValue};
    use xm_mem::MemoryIterator;
    use xm_model::{
        AgentDef, CompareOp, Condition, FunctionDef, MessageDef, ModelDef, Operand, VarDef,
    };

    use crate::{SimConfig, Simulation};
    use xm_exec::TransitionError;

    pub fn small_config() -> SimConfig {
        SimConfig {
            slots: 2,
            max_tasks_per_split: None,
            min_vector_size: None,
        }
    }

    // ── Circle (scenario S1) ──────────────────────────────────────────────

    pub fn circle_model() -> ModelDef {
        let mut model = ModelDef::new("circles");
        let mut agent = AgentDef::new("Circle");
        agent.vars = vec![
            VarDef::new("x_int", ScalarType::Int),
            VarDef::new("y_dbl", ScalarType::Double),
            VarDef::new("z_dbl", ScalarType::Double),
        ];
        let mut calc = FunctionDef::new("calc", "start", "end");
        calc.read_only = vec!["x_int".to_owned(), "y_dbl".to_owned()];
        calc.read_write = vec!["z_dbl".to_owned()];
        agent.functions.push(calc);
        model.agents.push(agent);
        model
    }

    pub fn circle_calc(
        it: &mut MemoryIterator<'_>,
        _mb: &mut BoardClient,
    ) -> Result<(), TransitionError> {
        let x = it.get::<i64>("x_int")?;
        let y = it.get::<f64>("y_dbl")?;
        it.set::<f64>("z_dbl", x as f64 * y)?;
        Ok(())
    }

    /// A compiled Circle simulation with `x_int[i] = i`, `y_dbl[i] = 2i`.
    pub fn circle_sim(n: i64, config: SimConfig) -> Simulation {
        let mut sim = Simulation::new(circle_model()).unwrap();
        sim.register_transition("Circle", "calc", circle_calc);
        for i in 0..n {
            sim.append_value("Circle", "x_int", ScalarValue::Int(i)).unwrap();
            sim.append_value("Circle", "y_dbl", ScalarValue::Double(i as f64 * 2.0))
                .unwrap();
            sim.append_value("Circle", "z_dbl", ScalarValue::Double(0.0))
                .unwrap();
        }
        sim.compile(config).unwrap();
        sim
    }

    // ── Message round trip (scenario S3) ──────────────────────────────────

    pub fn round_trip_model() -> ModelDef {
        let mut model = ModelDef::new("round_trip");
        model.messages.push({
            let mut m = MessageDef::new("m");
            m.vars.push(VarDef::new("v", ScalarType::Int));
            m
        });

        let mut a = AgentDef::new("A");
        a.vars = vec![VarDef::new("armed", ScalarType::Int)];
        let mut post = FunctionDef::new("post_m", "start", "end");
        post.read_write = vec!["armed".to_owned()];
        post.outputs = vec!["m".to_owned()];
        a.functions.push(post);
        model.agents.push(a);

        let mut b = AgentDef::new("B");
        b.vars = vec![VarDef::new("count_m", ScalarType::Int)];
        let mut read = FunctionDef::new("read_m", "start", "end");
        read.read_write = vec!["count_m".to_owned()];
        read.inputs = vec!["m".to_owned()];
        b.functions.push(read);
        model.agents.push(b);

        model
    }

    /// Posts `m{v=7}` once, then disarms so later iterations stay silent.
    pub fn post_once(
        it: &mut MemoryIterator<'_>,
        mb: &mut BoardClient,
    ) -> Result<(), TransitionError> {
        if it.get::<i64>("armed")? == 0 {
            return Ok(());
        }
        let mut msg = mb.new_message("m")?;
        msg.set::<i64>("v", 7)?;
        msg.post()?;
        it.set::<i64>("armed", 0)?;
        Ok(())
    }

    pub fn count_m(
        it: &mut MemoryIterator<'_>,
        mb: &mut BoardClient,
    ) -> Result<(), TransitionError> {
        let mut messages = mb.get_messages("m")?;
        let mut count = 0i64;
        while !messages.at_end() {
            if messages.get::<i64>("v")? == 7 {
                count += 1;
            }
            messages.next();
        }
        it.set::<i64>("count_m", count)?;
        Ok(())
    }

    // ── Conditional branches (scenario S4) ────────────────────────────────

    pub fn branching_model() -> ModelDef {
        let mut model = ModelDef::new("branching");
        let mut agent = AgentDef::new("Walker");
        agent.vars = vec![
            VarDef::new("x", ScalarType::Int),
            VarDef::new("y", ScalarType::Int),
        ];
        let positive = Condition::Compare {
            lhs: Operand::Var("x".to_owned()),
            op: CompareOp::Gt,
            rhs: Operand::Int(0),
        };
        let mut f_pos = FunctionDef::new("f_pos", "start", "end");
        f_pos.read_only = vec!["x".to_owned()];
        f_pos.read_write = vec!["y".to_owned()];
        f_pos.condition = Some(positive.clone());
        let mut f_neg = FunctionDef::new("f_neg", "start", "end");
        f_neg.read_only = vec!["x".to_owned()];
        f_neg.read_write = vec!["y".to_owned()];
        f_neg.condition = Some(Condition::Not(Box::new(positive)));
        agent.functions = vec![f_pos, f_neg];
        model.agents.push(agent);
        model
    }

    pub fn set_y_pos(
        it: &mut MemoryIterator<'_>,
        _mb: &mut BoardClient,
    ) -> Result<(), TransitionError> {
        it.set::<i64>("y", 1)?;
        Ok(())
    }

    pub fn set_y_neg(
        it: &mut MemoryIterator<'_>,
        _mb: &mut BoardClient,
    ) -> Result<(), TransitionError> {
        it.set::<i64>("y", -1)?;
        Ok(())
    }
}

#[cfg(test)]
mod scenarios {
    use xm_core::ScalarValue;

    use super::support::*;
    use crate::{NoopObserver, SimConfig, Simulation};

    /// S1 — single agent, single function: `z = x * y` over 10 rows.
    #[test]
    fn s1_single_function() {
        let mut sim = circle_sim(10, small_config());
        sim.run(1, &mut NoopObserver).unwrap();

        let ctx = sim.context().unwrap();
        let zs = ctx.memory().vector_of::<f64>("Circle", "z_dbl").unwrap();
        for (i, z) in zs.as_slice().iter().enumerate() {
            let i = i as f64;
            assert_eq!(*z, i * i * 2.0, "row {i}");
        }
    }

    /// S2 — two unconditional functions leaving one state must fail
    /// compilation with a message naming the conflicting variable.
    #[test]
    fn s2_same_path_double_write_rejected() {
        let mut model = circle_model();
        let mut dup = xm_model::FunctionDef::new("calc2", "start", "end");
        dup.read_write = vec!["z_dbl".to_owned()];
        model.agents[0].functions.push(dup);

        let err = Simulation::new(model).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("z_dbl"), "{text}");
    }

    /// S3 — message round trip: every B counts A's posts in iteration one
    /// and sees an empty board in iteration two.
    #[test]
    fn s3_message_round_trip() {
        let n_a = 5i64;
        let n_b = 3i64;
        let mut sim = Simulation::new(round_trip_model()).unwrap();
        sim.register_transition("A", "post_m", post_once);
        sim.register_transition("B", "read_m", count_m);
        for _ in 0..n_a {
            sim.append_value("A", "armed", ScalarValue::Int(1)).unwrap();
        }
        for _ in 0..n_b {
            sim.append_value("B", "count_m", ScalarValue::Int(-1)).unwrap();
        }
        sim.compile(small_config()).unwrap();

        sim.run(1, &mut NoopObserver).unwrap();
        {
            let ctx = sim.context().unwrap();
            let counts = ctx.memory().vector_of::<i64>("B", "count_m").unwrap();
            assert_eq!(counts.as_slice(), &[n_a, n_a, n_a]);
            // The clear task ran; nothing is left on the board.
            assert_eq!(ctx.boards().committed_count("m").unwrap(), 0);
        }

        sim.run(1, &mut NoopObserver).unwrap();
        let ctx = sim.context().unwrap();
        let counts = ctx.memory().vector_of::<i64>("B", "count_m").unwrap();
        assert_eq!(counts.as_slice(), &[0, 0, 0]);
    }

    /// S4 — conditional state: exactly one branch runs per agent and the
    /// unselected branch leaves its writes untouched.
    #[test]
    fn s4_conditional_branches() {
        let mut sim = Simulation::new(branching_model()).unwrap();
        sim.register_transition("Walker", "f_pos", set_y_pos);
        sim.register_transition("Walker", "f_neg", set_y_neg);
        for i in 0..8i64 {
            let x = if i % 2 == 0 { 1 } else { -1 };
            sim.append_value("Walker", "x", ScalarValue::Int(x)).unwrap();
            sim.append_value("Walker", "y", ScalarValue::Int(0)).unwrap();
        }
        sim.compile(small_config()).unwrap();
        sim.run(1, &mut NoopObserver).unwrap();

        let ctx = sim.context().unwrap();
        let xs = ctx.memory().vector_of::<i64>("Walker", "x").unwrap();
        let ys = ctx.memory().vector_of::<i64>("Walker", "y").unwrap();
        for (x, y) in xs.as_slice().iter().zip(ys.as_slice()) {
            assert_eq!(*y, if *x > 0 { 1 } else { -1 });
        }
    }

    /// S5 — splitting invariance: one sub-task per split vs. many produces
    /// bit-identical final vectors.
    #[test]
    fn s5_splitting_invariance() {
        let run = |max_splits: usize| -> Vec<f64> {
            let config = SimConfig {
                slots: 4,
                max_tasks_per_split: Some(max_splits),
                min_vector_size: Some(10),
            };
            let mut sim = circle_sim(200, config);
            sim.run(1, &mut NoopObserver).unwrap();
            let ctx = sim.context().unwrap();
            ctx.memory()
                .vector_of::<f64>("Circle", "z_dbl")
                .unwrap()
                .as_slice()
                .to_vec()
        };

        let unsplit = run(1);
        let split = run(4);
        assert_eq!(unsplit, split);
        assert!(unsplit.iter().any(|z| *z != 0.0));
    }

    /// Iterations are serial: values accumulate across runs.
    #[test]
    fn iterations_are_ordered() {
        let mut sim = circle_sim(4, small_config());
        sim.run(3, &mut NoopObserver).unwrap();
        // calc is idempotent, so three iterations equal one.
        let ctx = sim.context().unwrap();
        let zs = ctx.memory().vector_of::<f64>("Circle", "z_dbl").unwrap();
        assert_eq!(zs.as_slice()[3], 3.0 * 6.0);
    }

    #[test]
    fn run_before_compile_is_rejected() {
        let mut sim = Simulation::new(circle_model()).unwrap();
        sim.register_transition("Circle", "calc", circle_calc);
        assert!(sim.run(1, &mut NoopObserver).is_err());
    }

    #[test]
    fn observer_sees_every_iteration() {
        struct Counting {
            started: Vec<u64>,
            ended: Vec<u64>,
        }
        impl crate::SimObserver for Counting {
            fn on_iteration_start(&mut self, i: u64) {
                self.started.push(i);
            }
            fn on_iteration_end(&mut self, i: u64, _compacted: usize) {
                self.ended.push(i);
            }
        }

        let mut sim = circle_sim(3, small_config());
        let mut obs = Counting {
            started: Vec::new(),
            ended: Vec::new(),
        };
        sim.run(2, &mut obs).unwrap();
        assert_eq!(obs.started, vec![0, 1]);
        assert_eq!(obs.ended, vec![0, 1]);
    }
}

#[cfg(test)]
mod files {
    use std::io::Write;

    use xm_io::{OutputFormat, XmlPopReader, make_sink};

    use super::support::*;
    use crate::{NoopObserver, Simulation};

    /// Full file path: XML population in, iterations, XML snapshots out,
    /// numbered from the input's `itno`.
    #[test]
    fn xml_population_in_and_out() {
        let dir = tempfile::tempdir().unwrap();
        let pop_path = dir.path().join("0.xml");
        let mut pop = std::fs::File::create(&pop_path).unwrap();
        writeln!(pop, "<states>").unwrap();
        writeln!(pop, "<itno>0</itno>").unwrap();
        for i in 0..4 {
            writeln!(
                pop,
                "<xagent><name>Circle</name><x_int>{i}</x_int><y_dbl>{}.0</y_dbl><z_dbl>0.0</z_dbl></xagent>",
                i * 2
            )
            .unwrap();
        }
        writeln!(pop, "</states>").unwrap();
        drop(pop);

        let mut sim = Simulation::new(circle_model()).unwrap();
        sim.register_transition("Circle", "calc", circle_calc);
        let mut reader = XmlPopReader::new(sim.schema());
        let itno = sim.load_population(&mut reader, &pop_path).unwrap();
        assert_eq!(itno, 0);

        sim.set_output(make_sink(OutputFormat::Xml, dir.path(), ""));
        sim.compile(small_config()).unwrap();
        sim.run(2, &mut NoopObserver).unwrap();

        // Snapshots continue the input numbering.
        let first = std::fs::read_to_string(dir.path().join("1.xml")).unwrap();
        assert!(first.contains("<itno>1</itno>"));
        assert!(first.contains("<z_dbl>"), "{first}");
        // z[3] = 3 * 6.0
        assert!(first.contains("<z_dbl>18</z_dbl>"), "{first}");
        assert!(dir.path().join("2.xml").exists());
    }
}
