//! The audio-thread half of the session: the per-block process step.
//!
//! The audio backend calls `process_begin`, feeds MIDI, calls `process`,
//! then `process_end`. All state shared with the main thread goes through
//! atomics and the coalescing queues; this half never blocks on the main
//! thread.

use crate::events::EventList;
use crate::host::{HostShared, PluginParamUpdate};
use crate::midi::{self, KeySlots, MidiMessage};
use crate::queue::ReducingQueueProducer;
use crate::session::SessionState;
use crate::thread::{self, ThreadRole};

use clap_sys::audio_buffer::clap_audio_buffer;
use clap_sys::process::{clap_process, CLAP_PROCESS_ERROR, CLAP_PROCESS_SLEEP};
use std::ptr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// One block of audio I/O from the backend: fixed channel count, `frames`
/// samples per channel.
pub struct AudioBlock<'a> {
    pub inputs: &'a [&'a [f32]],
    pub outputs: &'a mut [&'a mut [f32]],
    pub frames: u32,
}

impl AudioBlock<'_> {
    fn silence(&mut self) {
        for channel in self.outputs.iter_mut() {
            channel.fill(0.0);
        }
    }
}

pub struct AudioProcessor {
    shared: Arc<HostShared>,
    output_producer: ReducingQueueProducer<PluginParamUpdate>,
    ev_in: EventList,
    ev_out: EventList,
    key_slots: Arc<KeySlots>,
    steady_time: i64,
    sample_rate: f64,
    current_frames: u32,
}

impl AudioProcessor {
    pub(crate) fn new(
        shared: Arc<HostShared>,
        output_producer: ReducingQueueProducer<PluginParamUpdate>,
    ) -> Self {
        Self {
            shared,
            output_producer,
            ev_in: EventList::new(),
            ev_out: EventList::new(),
            key_slots: Arc::new(KeySlots::new()),
            steady_time: 0,
            sample_rate: 0.0,
            current_frames: 0,
        }
    }

    /// The pending-key queue the UI layer pushes into.
    pub fn key_slots(&self) -> Arc<KeySlots> {
        Arc::clone(&self.key_slots)
    }

    /// Must match the rate the plugin was activated with; used to convert
    /// MIDI timestamps into block offsets.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    pub fn steady_time(&self) -> i64 {
        self.steady_time
    }

    /// Begin a block: the calling thread adopts the audio role and pending
    /// key events enter the block at offset zero.
    pub fn process_begin(&mut self, frames: u32) {
        thread::set_role(ThreadRole::Audio);
        self.current_frames = frames;

        let slots = Arc::clone(&self.key_slots);
        slots.drain(|event| {
            if event.release {
                self.note_off(0, 0, i16::from(event.key), event.velocity);
            } else {
                self.note_on(0, 0, i16::from(event.key), event.velocity);
            }
        });
    }

    /// End a block: advance the steady-time counter by exactly the frame
    /// count and drop the audio role.
    pub fn process_end(&mut self, frames: u32) {
        self.steady_time += i64::from(frames);
        thread::set_role(ThreadRole::Unknown);
    }

    pub fn note_on(&mut self, sample_offset: u32, channel: i16, key: i16, velocity: u8) {
        thread::assert_audio_thread();
        self.ev_in
            .push_note_on(sample_offset, channel, key, f64::from(velocity) / 127.0);
    }

    pub fn note_off(&mut self, sample_offset: u32, channel: i16, key: i16, velocity: u8) {
        thread::assert_audio_thread();
        self.ev_in
            .push_note_off(sample_offset, channel, key, f64::from(velocity) / 127.0);
    }

    pub fn control_change(&mut self, sample_offset: u32, channel: u8, controller: u8, value: u8) {
        thread::assert_audio_thread();
        self.ev_in
            .push_midi(sample_offset, [0xb0 | (channel & 0x0f), controller, value]);
    }

    pub fn pitch_bend(&mut self, sample_offset: u32, channel: u8, value: u16) {
        thread::assert_audio_thread();
        let lsb = (value & 0x7f) as u8;
        let msb = ((value >> 7) & 0x7f) as u8;
        self.ev_in
            .push_midi(sample_offset, [0xe0 | (channel & 0x0f), lsb, msb]);
    }

    /// Translate one raw channel-voice message from the MIDI backend into
    /// the current block, timestamped from its origin time.
    pub fn handle_midi(&mut self, bytes: [u8; 3], message_time_ms: f64, callback_time_ms: f64) {
        thread::assert_audio_thread();
        let Some(message) = MidiMessage::parse(bytes) else {
            tracing::debug!("ignoring non-channel-voice midi message {bytes:02x?}");
            return;
        };
        let offset = midi::block_offset(
            callback_time_ms,
            message_time_ms,
            self.sample_rate,
            self.current_frames.max(1),
        );

        match message {
            MidiMessage::NoteOn {
                channel,
                key,
                velocity,
            } => self.note_on(offset, i16::from(channel), i16::from(key), velocity),
            MidiMessage::NoteOff {
                channel,
                key,
                velocity,
            } => self.note_off(offset, i16::from(channel), i16::from(key), velocity),
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } => self.control_change(offset, channel, controller, value),
            MidiMessage::PitchBend { channel, value } => self.pitch_bend(offset, channel, value),
            MidiMessage::PolyPressure {
                channel,
                key,
                pressure,
            } => self
                .ev_in
                .push_midi(offset, [0xa0 | (channel & 0x0f), key, pressure]),
            MidiMessage::ChannelPressure { channel, pressure } => self
                .ev_in
                .push_midi(offset, [0xd0 | (channel & 0x0f), pressure, 0]),
            MidiMessage::ProgramChange { channel, program } => self
                .ev_in
                .push_midi(offset, [0xc0 | (channel & 0x0f), program, 0]),
        }
    }

    /// The process step: drain pending parameter updates into the block,
    /// wake or stop the plugin as scheduled, run it, and route its output
    /// events toward the main thread.
    pub fn process(&mut self, block: &mut AudioBlock<'_>) {
        thread::assert_audio_thread();

        let Some(plugin) = self.shared.plugin() else {
            self.ev_in.clear();
            block.silence();
            return;
        };
        if !self.shared.is_plugin_active() {
            self.ev_in.clear();
            block.silence();
            return;
        }

        // A stop request wins over everything else; the actual deactivation
        // happens on the main thread once it observes the acknowledgement.
        if self.shared.schedule_deactivate.swap(false, Ordering::SeqCst) {
            if self.shared.is_plugin_processing() {
                plugin.stop_processing();
            }
            self.shared
                .set_session_state(SessionState::ActiveAndReadyToDeactivate);
            self.ev_in.clear();
            block.silence();
            return;
        }

        // A plugin that failed to start processing stays silent until the
        // session is deactivated and reactivated.
        if self.shared.session_state() == SessionState::ActiveWithError {
            self.ev_in.clear();
            block.silence();
            return;
        }

        self.ev_out.clear();
        self.shared.drain_param_queues_into(&mut self.ev_in);

        if self.shared.is_plugin_sleeping() {
            let wake_requested = self.shared.schedule_process.load(Ordering::SeqCst);
            if !wake_requested && self.ev_in.is_empty() {
                // Sleeping, no wake request, nothing to deliver.
                block.silence();
                return;
            }

            self.shared.schedule_process.store(false, Ordering::SeqCst);
            if !plugin.start_processing() {
                self.shared.set_session_state(SessionState::ActiveWithError);
                self.ev_in.clear();
                block.silence();
                return;
            }
            self.shared
                .set_session_state(SessionState::ActiveAndProcessing);
        }

        let input_ptrs: Vec<*const f32> = block
            .inputs
            .iter()
            .map(|channel| channel.as_ptr())
            .collect();
        let output_ptrs: Vec<*const f32> = block
            .outputs
            .iter_mut()
            .map(|channel| channel.as_mut_ptr() as *const f32)
            .collect();

        let mut audio_inputs = clap_audio_buffer {
            data32: input_ptrs.as_ptr(),
            data64: ptr::null(),
            channel_count: block.inputs.len() as u32,
            latency: 0,
            constant_mask: 0,
        };
        let mut audio_outputs = clap_audio_buffer {
            data32: output_ptrs.as_ptr(),
            data64: ptr::null(),
            channel_count: block.outputs.len() as u32,
            latency: 0,
            constant_mask: 0,
        };

        let in_events = self.ev_in.as_input();
        let out_events = self.ev_out.as_output();

        let process_data = clap_process {
            steady_time: self.steady_time,
            frames_count: block.frames,
            transport: ptr::null(),
            audio_inputs: &mut audio_inputs,
            audio_outputs: &mut audio_outputs,
            audio_inputs_count: 1,
            audio_outputs_count: 1,
            in_events: &in_events,
            out_events: &out_events,
        };

        let status = if self.shared.is_plugin_processing() {
            plugin.process(&process_data)
        } else {
            CLAP_PROCESS_SLEEP
        };
        if status == CLAP_PROCESS_ERROR {
            tracing::warn!("plugin returned CLAP_PROCESS_ERROR");
        }

        self.shared
            .collect_output_events(&self.ev_out, &mut self.output_producer);
        self.ev_out.clear();
        self.ev_in.clear();
        self.output_producer.publish();
    }
}
