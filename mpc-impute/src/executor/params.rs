use crate::{
    endpoints::{resolve, ResolvedEndpoints},
    error::TaskError,
};
use mpc_impute_common::task::{node_id_for_party, ParamMap, Task};
use std::{collections::BTreeMap, path::PathBuf};

pub const DATA_FILE: &str = "Data_File";
pub const COLUMN_INFO: &str = "ColumnInfo";
pub const RES_FILE_NAME: &str = "ResFileName";

/// Declared numeric type of a column, with its wire code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnDtype {
    Integer,
    Float,
}

impl TryFrom<u8> for ColumnDtype {
    type Error = TaskError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(ColumnDtype::Integer),
            2 => Ok(ColumnDtype::Float),
            other => Err(TaskError::Param(format!("unknown column dtype code {other}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name:  String,
    pub dtype: ColumnDtype,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskParams {
    pub data_file:     PathBuf,
    /// Every declared column in name order, identical on all parties.
    pub columns:       Vec<ColumnDescriptor>,
    /// Declared dataset names mapped to their owning node.
    pub dataset_owner: BTreeMap<String, String>,
    pub local_dataset: String,
    pub res_file_name: String,
}

fn required_str<'a>(params: &'a ParamMap, key: &str) -> Result<&'a str, TaskError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| TaskError::Param(format!("missing string parameter {key}")))
}

impl TaskParams {
    /// Reads `Data_File`, `ColumnInfo` and `ResFileName`. `ColumnInfo` maps
    /// dataset names to `{column: dtype code}`; each dataset name is itself a
    /// parameter naming the node that owns it.
    pub fn parse(params: &ParamMap, owner_id: &str) -> Result<Self, TaskError> {
        let data_file = PathBuf::from(required_str(params, DATA_FILE)?);
        let res_file_name = required_str(params, RES_FILE_NAME)?.to_string();

        let column_info: BTreeMap<String, BTreeMap<String, u8>> =
            serde_json::from_str(required_str(params, COLUMN_INFO)?)
                .map_err(|e| TaskError::Param(format!("{COLUMN_INFO} is not valid: {e}")))?;

        let mut dtypes: BTreeMap<String, ColumnDtype> = BTreeMap::new();
        let mut dataset_owner = BTreeMap::new();
        for (dataset, columns) in column_info {
            for (column, code) in columns {
                let dtype = ColumnDtype::try_from(code)?;
                if let Some(previous) = dtypes.insert(column.clone(), dtype) {
                    if previous != dtype {
                        return Err(TaskError::Param(format!(
                            "column {column} declared as both {previous:?} and {dtype:?}"
                        )));
                    }
                }
            }
            if let Some(owner) = params.get(&dataset).and_then(|v| v.as_str()) {
                dataset_owner.insert(dataset, owner.to_string());
            }
        }

        let local_dataset = dataset_owner
            .iter()
            .find(|(_, owner)| owner.as_str() == owner_id)
            .map(|(dataset, _)| dataset.clone())
            .ok_or_else(|| {
                TaskError::Param(format!("no declared dataset is owned by {owner_id}"))
            })?;

        Ok(Self {
            data_file,
            columns: dtypes
                .into_iter()
                .map(|(name, dtype)| ColumnDescriptor { name, dtype })
                .collect(),
            dataset_owner,
            local_dataset,
            res_file_name,
        })
    }
}

/// Everything one party needs to run a task.
#[derive(Clone, Debug)]
pub struct TaskContext {
    pub job_id:     String,
    pub task_id:    String,
    pub node_id:    String,
    pub party_id:   usize,
    /// Node id the dataset bindings are matched against.
    pub owner_id:   String,
    /// The node hosts the whole ring.
    pub co_located: bool,
    pub endpoints:  ResolvedEndpoints,
    pub params:     TaskParams,
}

impl TaskContext {
    pub fn from_task(task: &Task, node_id: &str, party_id: usize) -> Result<Self, TaskError> {
        task.validate_node_task()?;
        let endpoints = resolve(node_id, party_id, &task.node_map)?;

        // A node hosting the whole ring matches bindings by logical party node id.
        let co_located = task
            .node_map
            .get(node_id)
            .is_some_and(|node| node.vm.len() > 1);
        let owner_id = if co_located {
            node_id_for_party(party_id)
        } else {
            node_id.to_string()
        };
        let params = TaskParams::parse(&task.params, &owner_id)?;

        Ok(Self {
            job_id: task.job_id.clone(),
            task_id: task.task_id.clone(),
            node_id: node_id.to_string(),
            party_id,
            owner_id,
            co_located,
            endpoints,
            params,
        })
    }
}
