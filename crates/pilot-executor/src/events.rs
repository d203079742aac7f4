use pilot_state_store::RunRecord;

/// Emitted as a run record changes state
#[derive(Clone, Debug)]
pub enum RunEvent {
    /// The run is persisted as `running`
    Started(RunRecord),
    /// The final record, as persisted
    Finished(RunRecord),
}

impl RunEvent {
    pub fn record(&self) -> &RunRecord {
        match self {
            RunEvent::Started(record) | RunEvent::Finished(record) => record,
        }
    }
}
