//! Voice registry — logical names to engine-assigned node ids.
//!
//! The engine owns id assignment, so `play` never touches the table; a row
//! appears only when the `created` confirmation comes back. `update` patches
//! rows optimistically before confirmation, and `kill` removes them
//! immediately — both tolerate the request being lost on the wire. A
//! confirmed `killed` deletes the row outright (matching the optimistic
//! local kill) rather than flipping status.
//!
//! One mutex serializes everything: caller-driven requests and bus-driven
//! confirmations land on the same table with no other protection, and table
//! operations are cheap relative to audio timing.

use std::sync::{Arc, Mutex};

use tracing::debug;

use scbridge_core::protocol::{EventKind, InboundEvent, OutboundMessage, Value};
use scbridge_core::table::{
    TableSnapshot, VoiceTable, COL_ID, COL_NAME, COL_STATUS, COL_TYPE, STATUS_PLAYING,
};

use crate::bus::MessageBus;

/// Cloneable handle to one voice table and its outbound bus.
#[derive(Clone)]
pub struct VoiceRegistry {
    table: Arc<Mutex<VoiceTable>>,
    bus: Arc<dyn MessageBus>,
}

impl VoiceRegistry {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self {
            table: Arc::new(Mutex::new(VoiceTable::new())),
            bus,
        }
    }

    /// Request one voice per frequency under a logical name.
    ///
    /// Emits N independent play requests for N frequencies; rows appear only
    /// as the engine confirms each creation, so there is no synchronous 1:1
    /// correspondence between a call and a table row.
    pub fn play(&self, name: &str, synth_type: &str, freqs: &[f64], params: &[(String, Value)]) {
        for &freq in freqs {
            debug!("play {name:?} type {synth_type} freq {freq}");
            self.bus
                .send(&OutboundMessage::play(synth_type, name, freq, params));
        }
    }

    /// Update every tracked voice under a logical name.
    ///
    /// The new values are written into the local rows before any confirmation
    /// arrives. If the request is lost, the table diverges from the engine
    /// until the next confirmed update for that voice — a known gap of the
    /// fire-and-forget channel, not something this layer papers over.
    pub fn update(&self, name: &str, params: &[(String, Value)]) {
        let mut table = self.table.lock().unwrap();
        let rows = table.rows_by_name(name);
        if rows.is_empty() {
            debug!("no voices tracked under {name:?}, update dropped");
            return;
        }
        for row in rows {
            let synth_type = table.value(row, COL_TYPE).to_string();
            let Ok(id) = table.value(row, COL_ID).parse::<i64>() else {
                continue;
            };
            self.bus
                .send(&OutboundMessage::update(&synth_type, id, params));
            for (key, value) in params {
                table.set(row, key, value.to_string());
            }
        }
    }

    /// Free every tracked voice under a logical name.
    ///
    /// Rows are removed immediately, without waiting for `killed`
    /// confirmations — optimistic and final on the local side.
    pub fn kill(&self, name: &str) {
        let mut table = self.table.lock().unwrap();
        let rows = table.rows_by_name(name);
        if rows.is_empty() {
            debug!("no voices to kill under {name:?}");
            return;
        }
        // collect first, then delete back-to-front so indices stay valid
        let targets: Vec<(usize, i64, String)> = rows
            .into_iter()
            .filter_map(|row| {
                let id = table.value(row, COL_ID).parse::<i64>().ok()?;
                Some((row, id, table.value(row, COL_TYPE).to_string()))
            })
            .collect();
        for (row, id, synth_type) in targets.into_iter().rev() {
            self.bus.send(&OutboundMessage::kill(&synth_type, id));
            table.remove_row(row);
        }
    }

    /// Apply one confirmation event from the engine.
    ///
    /// Events referencing unknown ids are dropped silently — with an
    /// unordered, at-most-once channel that is a normal race, not an error.
    pub fn handle_event(&self, event: InboundEvent) {
        let mut table = self.table.lock().unwrap();
        match event.kind {
            EventKind::Created => {
                if table.row_by_id(event.id).is_some() {
                    debug!("duplicate created for id {}, dropped", event.id);
                    return;
                }
                let name = event
                    .param(COL_NAME)
                    .unwrap_or(&event.synth_type)
                    .to_string();
                let mut cells: Vec<(&str, String)> = vec![
                    (COL_NAME, name),
                    (COL_ID, event.id.to_string()),
                    (COL_TYPE, event.synth_type.clone()),
                    (COL_STATUS, STATUS_PLAYING.to_string()),
                ];
                for (key, value) in &event.params {
                    if !matches!(key.as_str(), COL_NAME | COL_ID | COL_TYPE | COL_STATUS) {
                        cells.push((key.as_str(), value.clone()));
                    }
                }
                table.append_row(cells);
            }
            EventKind::Updated => {
                let Some(row) = table.row_by_id(event.id) else {
                    debug!("updated for unknown id {}, dropped", event.id);
                    return;
                };
                for (key, value) in &event.params {
                    table.set(row, key, value.clone());
                }
            }
            EventKind::Killed => {
                if !table.remove_by_id(event.id) {
                    debug!("killed for unknown id {}, dropped", event.id);
                }
            }
        }
    }

    /// Number of tracked voices.
    pub fn voice_count(&self) -> usize {
        self.table.lock().unwrap().len()
    }

    /// Column-ordered copy of the table for status endpoints.
    pub fn snapshot(&self) -> TableSnapshot {
        self.table.lock().unwrap().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::RecordingBus;
    use scbridge_core::protocol::Action;

    fn registry() -> (VoiceRegistry, Arc<RecordingBus>) {
        let bus = Arc::new(RecordingBus::new());
        (VoiceRegistry::new(bus.clone()), bus)
    }

    fn confirm_created(reg: &VoiceRegistry, id: i64, name: &str, freq: &str) {
        reg.handle_event(
            InboundEvent::parse_line(&format!("simpleSine {id} created name {name} freq {freq}"))
                .unwrap(),
        );
    }

    #[test]
    fn play_emits_one_message_per_freq_without_ids() {
        let (reg, bus) = registry();
        reg.play("pad1", "simpleSine", &[220.0, 330.0, 440.0], &[]);

        let sent = bus.take();
        assert_eq!(sent.len(), 3);
        for msg in &sent {
            assert_eq!(msg.action, Action::Play);
            assert!(msg.field("id").is_none());
            assert_eq!(msg.field("name"), Some(&Value::Str("pad1".into())));
        }
        // no speculative rows before confirmation
        assert_eq!(reg.voice_count(), 0);
    }

    #[test]
    fn created_confirmations_populate_the_table() {
        // Scenario A: two plays, two confirmations, two rows
        let (reg, bus) = registry();
        reg.play("pad1", "simpleSine", &[220.0, 330.0], &[]);
        assert_eq!(bus.take().len(), 2);

        confirm_created(&reg, 5, "pad1", "220");
        confirm_created(&reg, 6, "pad1", "330");

        let snap = reg.snapshot();
        assert_eq!(snap.rows.len(), 2);
        let id_col = snap.columns.iter().position(|c| c == "id").unwrap();
        let status_col = snap.columns.iter().position(|c| c == "status").unwrap();
        assert_eq!(snap.rows[0][id_col], "5");
        assert_eq!(snap.rows[1][id_col], "6");
        assert_eq!(snap.rows[0][status_col], "playing");
        assert!(snap.columns.contains(&"freq".to_string()));
    }

    #[test]
    fn update_fans_out_per_row_and_patches_locally() {
        // Scenario B
        let (reg, bus) = registry();
        confirm_created(&reg, 5, "pad1", "220");
        confirm_created(&reg, 6, "pad1", "330");

        reg.update("pad1", &[("lpFreq".to_string(), Value::Int(1200))]);

        let sent = bus.take();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].field("id"), Some(&Value::Int(5)));
        assert_eq!(sent[1].field("id"), Some(&Value::Int(6)));
        for msg in &sent {
            assert_eq!(msg.action, Action::Update);
            assert_eq!(msg.field("lpFreq"), Some(&Value::Int(1200)));
        }

        let snap = reg.snapshot();
        let lp_col = snap.columns.iter().position(|c| c == "lpFreq").unwrap();
        assert_eq!(snap.rows[0][lp_col], "1200");
        assert_eq!(snap.rows[1][lp_col], "1200");
    }

    #[test]
    fn update_unknown_name_is_a_silent_noop() {
        let (reg, bus) = registry();
        confirm_created(&reg, 5, "pad1", "220");

        reg.update("ghost", &[("amp".to_string(), Value::Float(0.5))]);

        assert!(bus.take().is_empty());
        let snap = reg.snapshot();
        assert!(!snap.columns.contains(&"amp".to_string()));
    }

    #[test]
    fn update_leaves_other_names_untouched() {
        let (reg, bus) = registry();
        confirm_created(&reg, 5, "pad1", "220");
        confirm_created(&reg, 7, "bass", "55");

        reg.update("bass", &[("lpFreq".to_string(), Value::Int(400))]);

        let sent = bus.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].field("id"), Some(&Value::Int(7)));

        let snap = reg.snapshot();
        let lp_col = snap.columns.iter().position(|c| c == "lpFreq").unwrap();
        assert_eq!(snap.rows[0][lp_col], ""); // pad1 untouched, column default
        assert_eq!(snap.rows[1][lp_col], "400");
    }

    #[test]
    fn kill_removes_rows_immediately() {
        // Scenario C
        let (reg, bus) = registry();
        confirm_created(&reg, 5, "pad1", "220");
        confirm_created(&reg, 6, "pad1", "330");
        confirm_created(&reg, 7, "bass", "55");

        reg.kill("pad1");

        let sent = bus.take();
        assert_eq!(sent.len(), 2);
        let mut ids: Vec<_> = sent.iter().map(|m| m.field("id").cloned()).collect();
        ids.sort_by_key(|v| match v {
            Some(Value::Int(n)) => *n,
            _ => 0,
        });
        assert_eq!(ids, [Some(Value::Int(5)), Some(Value::Int(6))]);
        for msg in &sent {
            assert_eq!(msg.action, Action::Kill);
        }

        // bass survives, pad1 gone before any killed confirmation
        assert_eq!(reg.voice_count(), 1);
        let snap = reg.snapshot();
        assert_eq!(snap.rows[0][0], "bass");
    }

    #[test]
    fn kill_unknown_name_is_a_silent_noop() {
        let (reg, bus) = registry();
        reg.kill("ghost");
        assert!(bus.take().is_empty());
    }

    #[test]
    fn late_update_for_removed_id_is_dropped() {
        // Scenario D: updated arrives after the row was locally killed
        let (reg, _bus) = registry();
        confirm_created(&reg, 5, "pad1", "220");
        confirm_created(&reg, 6, "pad1", "330");
        reg.kill("pad1");

        let before = reg.snapshot();
        reg.handle_event(InboundEvent::parse_line("simpleSine 6 updated lpFreq 1200").unwrap());
        let after = reg.snapshot();

        assert_eq!(before.rows, after.rows);
        assert_eq!(reg.voice_count(), 0);
    }

    #[test]
    fn updated_mutates_exactly_one_row() {
        let (reg, _bus) = registry();
        confirm_created(&reg, 5, "pad1", "220");
        confirm_created(&reg, 6, "pad1", "330");

        reg.handle_event(InboundEvent::parse_line("simpleSine 6 updated freq 550").unwrap());

        let snap = reg.snapshot();
        let freq_col = snap.columns.iter().position(|c| c == "freq").unwrap();
        assert_eq!(snap.rows[0][freq_col], "220");
        assert_eq!(snap.rows[1][freq_col], "550");
    }

    #[test]
    fn killed_confirmation_removes_the_row() {
        let (reg, _bus) = registry();
        confirm_created(&reg, 5, "pad1", "220");

        reg.handle_event(InboundEvent::parse_line("simpleSine 5 killed").unwrap());
        assert_eq!(reg.voice_count(), 0);

        // second killed for the same id is a no-op
        reg.handle_event(InboundEvent::parse_line("simpleSine 5 killed").unwrap());
        assert_eq!(reg.voice_count(), 0);
    }

    #[test]
    fn duplicate_created_is_dropped() {
        let (reg, _bus) = registry();
        confirm_created(&reg, 5, "pad1", "220");
        confirm_created(&reg, 5, "other", "440");

        assert_eq!(reg.voice_count(), 1);
        let snap = reg.snapshot();
        assert_eq!(snap.rows[0][0], "pad1");
    }

    #[test]
    fn created_without_name_falls_back_to_synth_type() {
        let (reg, _bus) = registry();
        reg.handle_event(InboundEvent::parse_line("simpleSine 9 created freq 110").unwrap());

        let snap = reg.snapshot();
        assert_eq!(snap.rows[0][0], "simpleSine");
    }

    #[test]
    fn column_growth_is_monotone_across_events_and_updates() {
        let (reg, _bus) = registry();
        confirm_created(&reg, 5, "pad1", "220");
        let cols_before = reg.snapshot().columns.len();

        reg.handle_event(InboundEvent::parse_line("simpleSine 5 updated res 0.7").unwrap());
        reg.update("pad1", &[("lpFreq".to_string(), Value::Int(800))]);
        confirm_created(&reg, 6, "pad1", "330");

        let snap = reg.snapshot();
        assert!(snap.columns.len() > cols_before);
        assert!(snap.columns.contains(&"res".to_string()));
        assert!(snap.columns.contains(&"lpFreq".to_string()));
        // the new row has both columns, defaulted empty where never set
        let res_col = snap.columns.iter().position(|c| c == "res").unwrap();
        assert_eq!(snap.rows[1][res_col], "");
    }
}
