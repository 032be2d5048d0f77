//! The Circle model, end to end and entirely in code: one agent type with
//! three variables and one transition computing `z = x * y`.

use xm_board::BoardClient;
use xm_core::{ScalarType, ScalarValue};
use xm_exec::TransitionError;
use xm_mem::MemoryIterator;
use xm_model::{AgentDef, FunctionDef, ModelDef, VarDef};
use xm_sim::{NoopObserver, SimConfig, Simulation};

const POPULATION: i64 = 10;

fn circle_model() -> ModelDef {
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

fn calc(it: &mut MemoryIterator<'_>, _mb: &mut BoardClient) -> Result<(), TransitionError> {
    let x = it.get::<i64>("x_int")?;
    let y = it.get::<f64>("y_dbl")?;
    it.set::<f64>("z_dbl", x as f64 * y)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut sim = Simulation::new(circle_model())?;
    sim.register_transition("Circle", "calc", calc);
    for i in 0..POPULATION {
        sim.append_value("Circle", "x_int", ScalarValue::Int(i))?;
        sim.append_value("Circle", "y_dbl", ScalarValue::Double(i as f64 * 2.0))?;
        sim.append_value("Circle", "z_dbl", ScalarValue::Double(0.0))?;
    }
    sim.compile(SimConfig::default())?;
    sim.run(1, &mut NoopObserver)?;

    let ctx = sim.context()?;
    let zs = ctx.memory().vector_of::<f64>("Circle", "z_dbl")?;
    for (i, z) in zs.as_slice().iter().enumerate() {
        println!("circle {i}: z = {z}");
    }
    Ok(())
}
