//! Per-party runtime of the missing value imputation task.
//!
//! For every declared column, all three parties secret-share their local sum,
//! reveal the total and fill their local nulls with `total / 3`. Only the total
//! is ever opened.

pub mod params;
pub mod session;

use crate::{
    error::TaskError,
    executor::{
        params::{ColumnDescriptor, ColumnDtype, TaskContext},
        session::SessionFactory,
    },
    table::{Column, DataType, Field, Table},
};
use mpc_impute_common::{task::Task, NUM_PARTIES};
use mpc_impute_cpu::{
    execution::{player::Role, session::MpcSession},
    shares::{FixedD16, RingEncoding, Share},
};
use std::{
    fmt,
    path::{Path, PathBuf},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutorState {
    Init,
    ParamsLoaded,
    DatasetLoaded,
    SessionOpen,
    Aggregating(String),
    Imputing(String),
    Persisted,
    Completed,
    Failed,
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorState::Aggregating(column) => write!(f, "Aggregating({column})"),
            ExecutorState::Imputing(column) => write!(f, "Imputing({column})"),
            other => write!(f, "{other:?}"),
        }
    }
}

pub struct SecureAggregationExecutor {
    node_id:    String,
    party_id:   usize,
    output_dir: PathBuf,
    state:      ExecutorState,
}

impl SecureAggregationExecutor {
    pub fn new(node_id: impl Into<String>, party_id: usize, output_dir: impl AsRef<Path>) -> Self {
        Self {
            node_id: node_id.into(),
            party_id,
            output_dir: output_dir.as_ref().to_path_buf(),
            state: ExecutorState::Init,
        }
    }

    pub fn state(&self) -> &ExecutorState {
        &self.state
    }

    fn transition(&mut self, next: ExecutorState) {
        tracing::info!(
            "{} party {}: {} -> {}",
            self.node_id,
            self.party_id,
            self.state,
            next
        );
        self.state = next;
    }

    /// Runs `task` to a terminal state and returns the path of the written
    /// result.
    pub async fn run(
        &mut self,
        task: &Task,
        sessions: &dyn SessionFactory,
    ) -> Result<PathBuf, TaskError> {
        let result = self.execute(task, sessions).await;
        match &result {
            Ok(path) => {
                self.transition(ExecutorState::Completed);
                tracing::info!("party {} wrote {}", self.party_id, path.display());
                metrics::counter!("mpc_impute.tasks.completed").increment(1);
            }
            Err(e) => {
                self.transition(ExecutorState::Failed);
                tracing::error!("party {} failed task {}: {e}", self.party_id, task.task_id);
                metrics::counter!("mpc_impute.tasks.failed").increment(1);
            }
        }
        result
    }

    async fn execute(
        &mut self,
        task: &Task,
        sessions: &dyn SessionFactory,
    ) -> Result<PathBuf, TaskError> {
        let (ctx, mut table, mut session) = match self.open(task, sessions).await {
            Ok(opened) => opened,
            Err(e) => {
                if let Ok(role) = Role::try_from(self.party_id) {
                    sessions.abandon(role);
                }
                return Err(e);
            }
        };

        let outcome = self.process(&mut session, &ctx, &mut table).await;
        let closed = session.teardown().await;
        let path = outcome?;
        if let Err(e) = closed {
            tracing::warn!("party {} failed to close its links: {e:?}", self.party_id);
        }
        Ok(path)
    }

    async fn open(
        &mut self,
        task: &Task,
        sessions: &dyn SessionFactory,
    ) -> Result<(TaskContext, Table, MpcSession), TaskError> {
        let ctx = TaskContext::from_task(task, &self.node_id, self.party_id)?;
        self.transition(ExecutorState::ParamsLoaded);
        tracing::debug!(
            "party {} owns dataset {}, {} declared columns",
            self.party_id,
            ctx.params.local_dataset,
            ctx.params.columns.len()
        );

        let table = Table::load(&ctx.params.data_file)?;
        self.transition(ExecutorState::DatasetLoaded);

        let session = sessions.open(&ctx).await.map_err(TaskError::Session)?;
        self.transition(ExecutorState::SessionOpen);
        Ok((ctx, table, session))
    }

    async fn process(
        &mut self,
        session: &mut MpcSession,
        ctx: &TaskContext,
        table: &mut Table,
    ) -> Result<PathBuf, TaskError> {
        for column in &ctx.params.columns {
            self.transition(ExecutorState::Aggregating(column.name.clone()));
            let local = table.column_index(&column.name);
            let fill = aggregate(session, column, local.and_then(|i| table.column(i))).await?;

            if let Some(index) = local {
                self.transition(ExecutorState::Imputing(column.name.clone()));
                impute(table, index, &column.name, fill)?;
            }
        }

        let mut path = self.output_dir.clone();
        if ctx.co_located {
            path.push(format!("party{}", ctx.party_id));
        }
        path.push(format!("{}.csv", ctx.params.res_file_name));
        table.write(&path)?;
        self.transition(ExecutorState::Persisted);
        Ok(path)
    }
}

async fn share_sum_reveal<V: RingEncoding>(session: &mut MpcSession, partial: V) -> eyre::Result<V> {
    let shares = session.create_shares(partial).await?;
    let total: Share<u64> = shares.iter().sum();
    session.reveal_all(&total).await
}

/// Contributes the local sum of `column` (zero when absent) and derives the
/// fill value from the revealed total.
async fn aggregate(
    session: &mut MpcSession,
    descriptor: &ColumnDescriptor,
    column: Option<&Column>,
) -> Result<f64, TaskError> {
    let count = column.map(|c| c.len() - c.null_count()).unwrap_or(0);
    let fill = match descriptor.dtype {
        ColumnDtype::Integer => {
            let partial = column.map(Column::sum_i64).unwrap_or(0);
            tracing::debug!("{}: local partial {partial} over {count} values", descriptor.name);
            let total = share_sum_reveal(session, partial)
                .await
                .map_err(TaskError::Session)?;
            (total / NUM_PARTIES as i64) as f64
        }
        ColumnDtype::Float => {
            let partial = column.map(Column::sum_f64).unwrap_or(0.0);
            tracing::debug!("{}: local partial {partial} over {count} values", descriptor.name);
            let total = share_sum_reveal(session, FixedD16::new(partial))
                .await
                .map_err(TaskError::Session)?;
            total.value() / NUM_PARTIES as f64
        }
    };
    Ok(fill)
}

fn impute(table: &mut Table, index: usize, name: &str, fill: f64) -> Result<(), TaskError> {
    let Some(column) = table.column(index) else {
        return Err(TaskError::DatasetInconsistent(format!("no column at position {index}")));
    };
    let nulls = column.null_count();
    let filled = column
        .values_f64()
        .into_iter()
        .map(|v| Some(v.unwrap_or(fill)))
        .collect();
    table.replace_column(index, Field::new(name, DataType::Float64), Column::Float64(filled))?;
    tracing::debug!("{name}: replaced {nulls} nulls with {fill}");
    Ok(())
}
