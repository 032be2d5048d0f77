//! The task-body interpreter executed on worker threads.

use std::sync::Arc;

use xm_core::{ColumnView, ScalarType};

use crate::context::EngineContext;
use crate::error::{ExecError, ExecResult};
use crate::task::{Task, TaskBody, TaskKind};

/// Run one task (or one windowed sub-task) to completion.
pub(crate) fn run_task(
    task: &Arc<Task>,
    window: Option<(usize, usize)>,
    ctx: &Arc<EngineContext>,
) -> ExecResult<()> {
    match task.body() {
        TaskBody::Agent { func, guard } => run_agent_window(task, *func, guard, window, ctx),
        TaskBody::MsgSync => Ok(ctx.boards().sync(task.owner())?),
        TaskBody::MsgClear => Ok(ctx.boards().clear(task.owner())?),
        TaskBody::PopWrite => run_pop_write(task, ctx),
        TaskBody::Marker => run_marker(task, ctx),
    }
}

/// Walk the agent window, gate each row on the guard, and invoke the user
/// function for qualifying rows.
fn run_agent_window(
    task: &Arc<Task>,
    func: Option<crate::task::TransitionFn>,
    guard: &Option<Arc<dyn crate::task::RowGuard>>,
    window: Option<(usize, usize)>,
    ctx: &Arc<EngineContext>,
) -> ExecResult<()> {
    let shadow = task.shadow().ok_or_else(|| {
        ExecError::InvalidArgument(format!("agent task {:?} has no memory view", task.name()))
    })?;
    let mut cursor = match window {
        Some((offset, count)) => shadow.iter_window(offset, count)?,
        None => shadow.iter()?,
    };
    let mut client = task.proxy().client(Arc::clone(ctx.boards()));

    while !cursor.at_end() {
        let qualifies = match guard {
            Some(g) => g.test(&cursor)?,
            None => true,
        };
        if qualifies {
            if let Some(f) = func {
                f(&mut cursor, &mut client).map_err(|e| ExecError::FunctionAbort {
                    task: task.name().to_owned(),
                    agent: task.owner().to_owned(),
                    reason: e.0,
                })?;
            }
        }
        cursor.step();
    }
    Ok(())
}

/// Hand the task's final columns to the population sink, if one is installed.
fn run_pop_write(task: &Arc<Task>, ctx: &Arc<EngineContext>) -> ExecResult<()> {
    let mut sink = ctx.pop_sink();
    let Some(sink) = sink.as_mut() else {
        return Ok(()); // headless run: nothing to flush
    };
    let memory = ctx.memory().agent(task.owner())?;
    for var in task.writes() {
        match memory.scalar_type_of(var)? {
            ScalarType::Int => {
                let col = memory.vector_of::<i64>(var)?;
                sink.write_column(task.owner(), var, ColumnView::Int(col.as_slice()))?;
            }
            ScalarType::Double => {
                let col = memory.vector_of::<f64>(var)?;
                sink.write_column(task.owner(), var, ColumnView::Double(col.as_slice()))?;
            }
        }
    }
    Ok(())
}

/// Start/finish markers bracket the population snapshot for the iteration.
fn run_marker(task: &Arc<Task>, ctx: &Arc<EngineContext>) -> ExecResult<()> {
    let mut sink = ctx.pop_sink();
    let Some(sink) = sink.as_mut() else {
        return Ok(());
    };
    match task.kind() {
        TaskKind::StartModel => sink.init_write(ctx.iteration())?,
        TaskKind::FinishModel => sink.finalize_write()?,
        _ => {}
    }
    Ok(())
}
