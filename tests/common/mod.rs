//! Mock robot controller used by the integration suites.
//!
//! Speaks enough RTDE to drive the client through negotiation, recipe
//! setup, and streaming, applies input frames to a shared fake robot
//! state, and echoes DONE a configurable number of ticks after each
//! command. A second listener stands in for the script-upload port:
//! uploading the control script flips the program-running bit and the
//! ready register, while one-shot scripts are "executed" by replaying the
//! literal register writes they contain.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const RTDE_REQUEST_PROTOCOL_VERSION: u8 = 86;
const RTDE_GET_CONTROLLER_VERSION: u8 = 118;
const RTDE_DATA_PACKAGE: u8 = 85;
const RTDE_SETUP_OUTPUTS: u8 = 79;
const RTDE_SETUP_INPUTS: u8 = 73;
const RTDE_START: u8 = 83;
const RTDE_PAUSE: u8 = 80;

const RDY_FOR_CMD: i32 = 1;
const DONE_WITH_CMD: i32 = 2;

#[derive(Debug, Clone)]
pub struct MockOptions {
    pub version: (u32, u32, u32, u32),
    pub accept_v2: bool,
    /// Register window base the control interface under test uses.
    pub register_base: u32,
    pub tick: Duration,
    /// Ticks between receiving a command and echoing DONE.
    pub done_delay_ticks: u32,
    /// Ticks an asynchronous move stays in flight before progress drops
    /// back to -1.
    pub async_duration_ticks: u32,
    /// Delay between replayed register writes of a one-shot script.
    pub script_replay_delay: Duration,
    /// Return payload placed in the output double registers for
    /// vector-result commands.
    pub result_vector: [f64; 6],
    /// Return payload for scalar-result commands.
    pub result_scalar: f64,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            version: (5, 10, 0, 0),
            accept_v2: true,
            register_base: 0,
            tick: Duration::from_millis(2),
            done_delay_ticks: 2,
            async_duration_ticks: 100,
            script_replay_delay: Duration::from_millis(20),
            result_vector: [0.0; 6],
            result_scalar: 0.0,
        }
    }
}

/// One decoded input frame received from the client.
#[derive(Debug, Clone, Default)]
pub struct ReceivedCommand {
    pub recipe_id: u8,
    pub code: i32,
    pub int_registers: HashMap<u32, i32>,
    pub double_registers: HashMap<u32, f64>,
    pub byte_fields: HashMap<String, u8>,
    pub uint_fields: HashMap<String, u32>,
    pub double_fields: HashMap<String, f64>,
}

/// Fake robot state shared by every connection.
#[derive(Debug)]
pub struct MockState {
    pub timestamp: f64,
    pub joint_positions: [f64; 6],
    pub tcp_pose: [f64; 6],
    pub robot_status_bits: u32,
    pub safety_status_bits: u32,
    pub digital_output_bits: u64,
    pub output_ints: HashMap<u32, i32>,
    pub output_doubles: HashMap<u32, f64>,
    pub speed_slider_fraction: f64,
    pub analog_outputs: [f64; 2],
    pub tool_digital_bits: u8,
    pub received_commands: Vec<ReceivedCommand>,
    pub uploaded_scripts: Vec<String>,
}

impl MockState {
    fn new() -> Self {
        let mut output_ints = HashMap::new();
        // Async-progress registers idle in both windows.
        output_ints.insert(1, -1);
        output_ints.insert(25, -1);
        Self {
            timestamp: 1.0,
            joint_positions: [0.0, -1.57, 0.0, -1.57, 0.0, 0.0],
            tcp_pose: [-0.12, -0.43, 0.14, 0.0, 3.11, 0.04],
            robot_status_bits: 0b1, // power on
            safety_status_bits: 0b1, // normal mode
            digital_output_bits: 0,
            output_ints,
            output_doubles: HashMap::new(),
            speed_slider_fraction: 1.0,
            analog_outputs: [0.0; 2],
            tool_digital_bits: 0,
            received_commands: Vec::new(),
            uploaded_scripts: Vec::new(),
        }
    }

    /// Commands excluding the NOOP clears the client emits after each
    /// acknowledged command.
    pub fn real_commands(&self) -> Vec<ReceivedCommand> {
        self.received_commands
            .iter()
            .filter(|c| c.code != 0)
            .cloned()
            .collect()
    }
}

enum PendingWrite {
    OutputInt(u32, i32),
    OutputDouble(u32, f64),
}

pub struct MockController {
    rtde_port: u16,
    script_port: u16,
    state: Arc<Mutex<MockState>>,
    shutdown: Arc<AtomicBool>,
    generation: Arc<AtomicUsize>,
    handles: Vec<JoinHandle<()>>,
}

impl MockController {
    pub fn spawn(options: MockOptions) -> Self {
        let rtde_listener = TcpListener::bind("127.0.0.1:0").expect("bind rtde listener");
        let script_listener = TcpListener::bind("127.0.0.1:0").expect("bind script listener");
        rtde_listener.set_nonblocking(true).unwrap();
        script_listener.set_nonblocking(true).unwrap();
        let rtde_port = rtde_listener.local_addr().unwrap().port();
        let script_port = script_listener.local_addr().unwrap().port();

        let state = Arc::new(Mutex::new(MockState::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let generation = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        {
            let state = Arc::clone(&state);
            let shutdown = Arc::clone(&shutdown);
            let generation = Arc::clone(&generation);
            let options = options.clone();
            handles.push(std::thread::spawn(move || {
                accept_loop(rtde_listener, shutdown, move |stream, shutdown| {
                    serve_rtde(
                        stream,
                        Arc::clone(&state),
                        options.clone(),
                        shutdown,
                        Arc::clone(&generation),
                    )
                })
            }));
        }
        {
            let state = Arc::clone(&state);
            let shutdown = Arc::clone(&shutdown);
            let options = options.clone();
            handles.push(std::thread::spawn(move || {
                accept_loop(script_listener, shutdown, move |stream, shutdown| {
                    serve_script(stream, Arc::clone(&state), options.clone(), shutdown)
                })
            }));
        }

        Self {
            rtde_port,
            script_port,
            state,
            shutdown,
            generation,
            handles,
        }
    }

    pub fn rtde_port(&self) -> u16 {
        self.rtde_port
    }

    pub fn script_port(&self) -> u16 {
        self.script_port
    }

    pub fn state(&self) -> Arc<Mutex<MockState>> {
        Arc::clone(&self.state)
    }

    /// Drop every live RTDE connection, simulating a transport failure.
    /// The listeners keep accepting, so clients can reconnect.
    pub fn kill_connections(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for MockController {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn accept_loop<F>(listener: TcpListener, shutdown: Arc<AtomicBool>, serve: F)
where
    F: Fn(TcpStream, Arc<AtomicBool>) + Clone + Send + 'static,
{
    let mut workers = Vec::new();
    while !shutdown.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                let serve = serve.clone();
                let shutdown = Arc::clone(&shutdown);
                workers.push(std::thread::spawn(move || serve(stream, shutdown)));
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(_) => break,
        }
    }
    for worker in workers {
        let _ = worker.join();
    }
}

fn read_packet_nonblocking(stream: &mut TcpStream) -> std::io::Result<Option<(u8, Vec<u8>)>> {
    let mut header = [0u8; 3];
    let n = match stream.read(&mut header) {
        Ok(0) => return Err(std::io::Error::new(ErrorKind::UnexpectedEof, "closed")),
        Ok(n) => n,
        Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
            return Ok(None)
        }
        Err(e) => return Err(e),
    };
    // The rest of the packet is in flight; block briefly for it.
    stream.set_read_timeout(Some(Duration::from_millis(500)))?;
    if n < 3 {
        stream.read_exact(&mut header[n..])?;
    }
    let size = u16::from_be_bytes([header[0], header[1]]) as usize;
    let mut payload = vec![0u8; size.saturating_sub(3)];
    stream.read_exact(&mut payload)?;
    stream.set_read_timeout(Some(Duration::from_millis(1)))?;
    Ok(Some((header[2], payload)))
}

fn write_packet(stream: &mut TcpStream, package_type: u8, payload: &[u8]) -> std::io::Result<()> {
    let size = (3 + payload.len()) as u16;
    let mut packet = Vec::with_capacity(size as usize);
    packet.extend_from_slice(&size.to_be_bytes());
    packet.push(package_type);
    packet.extend_from_slice(payload);
    stream.write_all(&packet)
}

/// Wire type assigned to each known variable name.
fn variable_type(name: &str) -> &'static str {
    if name.starts_with("input_int_register_") || name.starts_with("output_int_register_") {
        return "INT32";
    }
    if name.starts_with("input_double_register_") || name.starts_with("output_double_register_") {
        return "DOUBLE";
    }
    match name {
        "timestamp"
        | "actual_execution_time"
        | "speed_scaling"
        | "target_speed_fraction"
        | "actual_momentum"
        | "actual_main_voltage"
        | "actual_robot_voltage"
        | "actual_robot_current"
        | "standard_analog_input0"
        | "standard_analog_input1"
        | "standard_analog_output0"
        | "standard_analog_output1"
        | "speed_slider_fraction"
        | "standard_analog_output_0"
        | "standard_analog_output_1" => "DOUBLE",
        "target_q" | "target_qd" | "target_qdd" | "target_current" | "target_moment"
        | "actual_q" | "actual_qd" | "actual_current" | "joint_control_output"
        | "actual_TCP_pose" | "actual_TCP_speed" | "actual_TCP_force" | "target_TCP_pose"
        | "target_TCP_speed" | "joint_temperatures" | "actual_joint_voltage" => "VECTOR6D",
        "actual_tool_accelerometer" => "VECTOR3D",
        "joint_mode" => "VECTOR6INT32",
        "robot_mode" | "safety_mode" => "INT32",
        "robot_status_bits" | "safety_status_bits" | "runtime_state" | "speed_slider_mask" => {
            "UINT32"
        }
        "actual_digital_input_bits" | "actual_digital_output_bits" => "UINT64",
        "standard_digital_output_mask"
        | "standard_digital_output"
        | "tool_digital_output_mask"
        | "tool_digital_output"
        | "standard_analog_output_mask"
        | "standard_analog_output_type" => "UINT8",
        _ => "NOT_FOUND",
    }
}

fn type_size(type_name: &str) -> usize {
    match type_name {
        "UINT8" | "BOOL" => 1,
        "INT32" | "UINT32" => 4,
        "DOUBLE" | "UINT64" => 8,
        "VECTOR3D" | "VECTOR6INT32" => 24,
        "VECTOR6D" => 48,
        _ => 0,
    }
}

fn encode_output_field(name: &str, type_name: &str, state: &MockState, out: &mut Vec<u8>) {
    match type_name {
        "DOUBLE" => {
            let value = match name {
                "timestamp" => state.timestamp,
                "standard_analog_output0" => state.analog_outputs[0],
                "standard_analog_output1" => state.analog_outputs[1],
                _ => {
                    if let Some(idx) = name.strip_prefix("output_double_register_") {
                        let register: u32 = idx.parse().unwrap_or(0);
                        *state.output_doubles.get(&register).unwrap_or(&0.0)
                    } else {
                        0.0
                    }
                }
            };
            out.extend_from_slice(&value.to_be_bytes());
        }
        "INT32" => {
            let value = if let Some(idx) = name.strip_prefix("output_int_register_") {
                let register: u32 = idx.parse().unwrap_or(0);
                *state.output_ints.get(&register).unwrap_or(&0)
            } else {
                // robot_mode / safety_mode
                7
            };
            out.extend_from_slice(&value.to_be_bytes());
        }
        "UINT32" => {
            let value = match name {
                "robot_status_bits" => state.robot_status_bits,
                "safety_status_bits" => state.safety_status_bits,
                _ => 0u32,
            };
            out.extend_from_slice(&value.to_be_bytes());
        }
        "UINT64" => {
            let value = match name {
                "actual_digital_output_bits" => state.digital_output_bits,
                _ => 0u64,
            };
            out.extend_from_slice(&value.to_be_bytes());
        }
        "VECTOR6D" => {
            let values = match name {
                "actual_q" | "target_q" => state.joint_positions,
                "actual_TCP_pose" | "target_TCP_pose" => state.tcp_pose,
                _ => [0.0; 6],
            };
            for v in values {
                out.extend_from_slice(&v.to_be_bytes());
            }
        }
        "VECTOR3D" => {
            for _ in 0..3 {
                out.extend_from_slice(&0.0f64.to_be_bytes());
            }
        }
        "VECTOR6INT32" => {
            for _ in 0..6 {
                out.extend_from_slice(&0i32.to_be_bytes());
            }
        }
        _ => {}
    }
}

fn serve_rtde(
    mut stream: TcpStream,
    state: Arc<Mutex<MockState>>,
    options: MockOptions,
    shutdown: Arc<AtomicBool>,
    generation: Arc<AtomicUsize>,
) {
    let my_generation = generation.load(Ordering::SeqCst);
    stream.set_nodelay(true).ok();
    stream
        .set_read_timeout(Some(Duration::from_millis(1)))
        .unwrap();

    let mut protocol_version: u16 = 1;
    let mut output_recipe: Option<Vec<(String, &'static str)>> = None;
    let mut input_recipes: HashMap<u8, Vec<(String, &'static str)>> = HashMap::new();
    let mut next_input_id: u8 = 1;
    let mut started = false;
    let mut last_frame = Instant::now();
    let mut pending: Vec<(Instant, PendingWrite)> = Vec::new();

    loop {
        if shutdown.load(Ordering::SeqCst) || generation.load(Ordering::SeqCst) != my_generation {
            return;
        }

        match read_packet_nonblocking(&mut stream) {
            Ok(Some((package_type, payload))) => {
                let reply = handle_packet(
                    package_type,
                    &payload,
                    &state,
                    &options,
                    &mut protocol_version,
                    &mut output_recipe,
                    &mut input_recipes,
                    &mut next_input_id,
                    &mut started,
                    &mut pending,
                );
                if let Some((reply_type, reply_payload)) = reply {
                    if write_packet(&mut stream, reply_type, &reply_payload).is_err() {
                        return;
                    }
                }
            }
            Ok(None) => {}
            Err(_) => return,
        }

        // Apply due register writes.
        {
            let now = Instant::now();
            let mut state = state.lock().unwrap();
            pending.retain(|(due, write)| {
                if *due <= now {
                    match write {
                        PendingWrite::OutputInt(register, value) => {
                            state.output_ints.insert(*register, *value);
                        }
                        PendingWrite::OutputDouble(register, value) => {
                            state.output_doubles.insert(*register, *value);
                        }
                    }
                    false
                } else {
                    true
                }
            });
        }

        // Stream one output frame per tick.
        if started && last_frame.elapsed() >= options.tick {
            last_frame = Instant::now();
            if let Some(recipe) = &output_recipe {
                let frame = {
                    let mut state = state.lock().unwrap();
                    state.timestamp += options.tick.as_secs_f64();
                    let mut frame = vec![1u8];
                    for (name, type_name) in recipe {
                        encode_output_field(name, type_name, &state, &mut frame);
                    }
                    frame
                };
                if write_packet(&mut stream, RTDE_DATA_PACKAGE, &frame).is_err() {
                    return;
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_packet(
    package_type: u8,
    payload: &[u8],
    state: &Arc<Mutex<MockState>>,
    options: &MockOptions,
    protocol_version: &mut u16,
    output_recipe: &mut Option<Vec<(String, &'static str)>>,
    input_recipes: &mut HashMap<u8, Vec<(String, &'static str)>>,
    next_input_id: &mut u8,
    started: &mut bool,
    pending: &mut Vec<(Instant, PendingWrite)>,
) -> Option<(u8, Vec<u8>)> {
    match package_type {
        RTDE_REQUEST_PROTOCOL_VERSION => {
            let accepted = options.accept_v2 && payload == &[0u8, 2][..];
            if accepted {
                *protocol_version = 2;
            }
            Some((RTDE_REQUEST_PROTOCOL_VERSION, vec![accepted as u8]))
        }
        RTDE_GET_CONTROLLER_VERSION => {
            let (major, minor, bugfix, build) = options.version;
            let mut reply = Vec::new();
            for value in [major, minor, bugfix, build] {
                reply.extend_from_slice(&value.to_be_bytes());
            }
            Some((RTDE_GET_CONTROLLER_VERSION, reply))
        }
        RTDE_SETUP_OUTPUTS => {
            let names_start = if *protocol_version >= 2 { 8 } else { 0 };
            let names = String::from_utf8_lossy(&payload[names_start..]).to_string();
            let fields: Vec<(String, &'static str)> = names
                .split(',')
                .filter(|s| !s.is_empty())
                .map(|name| (name.to_string(), variable_type(name)))
                .collect();
            let types: Vec<&str> = fields.iter().map(|(_, t)| *t).collect();
            let mut reply = vec![1u8];
            reply.extend_from_slice(types.join(",").as_bytes());
            *output_recipe = Some(fields);
            Some((RTDE_SETUP_OUTPUTS, reply))
        }
        RTDE_SETUP_INPUTS => {
            let names = String::from_utf8_lossy(payload).to_string();
            let fields: Vec<(String, &'static str)> = names
                .split(',')
                .filter(|s| !s.is_empty())
                .map(|name| (name.to_string(), variable_type(name)))
                .collect();
            let types: Vec<&str> = fields.iter().map(|(_, t)| *t).collect();
            let id = *next_input_id;
            *next_input_id += 1;
            let mut reply = vec![id];
            reply.extend_from_slice(types.join(",").as_bytes());
            input_recipes.insert(id, fields);
            Some((RTDE_SETUP_INPUTS, reply))
        }
        RTDE_START => {
            *started = true;
            Some((RTDE_START, vec![1]))
        }
        RTDE_PAUSE => {
            *started = false;
            Some((RTDE_PAUSE, vec![1]))
        }
        RTDE_DATA_PACKAGE => {
            handle_input_frame(payload, state, options, input_recipes, pending);
            None
        }
        _ => None,
    }
}

fn handle_input_frame(
    payload: &[u8],
    state: &Arc<Mutex<MockState>>,
    options: &MockOptions,
    input_recipes: &HashMap<u8, Vec<(String, &'static str)>>,
    pending: &mut Vec<(Instant, PendingWrite)>,
) {
    let Some((&recipe_id, data)) = payload.split_first() else {
        return;
    };
    let Some(fields) = input_recipes.get(&recipe_id) else {
        return;
    };

    let mut command = ReceivedCommand {
        recipe_id,
        ..Default::default()
    };
    let mut offset = 0usize;
    for (name, type_name) in fields {
        let size = type_size(type_name);
        if offset + size > data.len() {
            return;
        }
        let raw = &data[offset..offset + size];
        offset += size;
        match *type_name {
            "INT32" => {
                let value = i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
                if let Some(idx) = name.strip_prefix("input_int_register_") {
                    command.int_registers.insert(idx.parse().unwrap(), value);
                }
            }
            "DOUBLE" => {
                let value = f64::from_be_bytes(raw.try_into().unwrap());
                if let Some(idx) = name.strip_prefix("input_double_register_") {
                    command.double_registers.insert(idx.parse().unwrap(), value);
                } else {
                    command.double_fields.insert(name.clone(), value);
                }
            }
            "UINT8" => {
                command.byte_fields.insert(name.clone(), raw[0]);
            }
            "UINT32" => {
                let value = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
                command.uint_fields.insert(name.clone(), value);
            }
            _ => {}
        }
    }

    let base = options.register_base;
    // The command slot is the lowest int register in the frame.
    command.code = command
        .int_registers
        .iter()
        .min_by_key(|(register, _)| **register)
        .map(|(_, value)| *value)
        .unwrap_or(0);

    let mut state_guard = state.lock().unwrap();
    apply_io_fields(&command, &mut state_guard);
    let code = command.code;
    let async_flag = command.int_registers.get(&(base + 1)) == Some(&1);
    state_guard.received_commands.push(command.clone());
    drop(state_guard);

    // Only frames carrying the command-slot register belong to the
    // command channel; I/O writes use a disjoint slot.
    let is_command_channel = command.int_registers.contains_key(&base);
    if is_command_channel && code != 0 {
        let now = Instant::now();
        let done_at = now + options.tick * options.done_delay_ticks;
        if (1..=5).contains(&code) && async_flag {
            // Async move: acknowledge right away, progress rises then
            // falls after the simulated motion time.
            pending.push((now, PendingWrite::OutputInt(base + 1, 0)));
            pending.push((now, PendingWrite::OutputInt(base, DONE_WITH_CMD)));
            pending.push((
                now + options.tick * options.async_duration_ticks,
                PendingWrite::OutputInt(base + 1, -1),
            ));
        } else {
            if code == 16 || code == 15 {
                // Stop commands cancel any async motion in flight.
                pending.retain(|(_, write)| {
                    !matches!(write, PendingWrite::OutputInt(register, _) if *register == base + 1)
                });
                pending.push((now, PendingWrite::OutputInt(base + 1, -1)));
            }
            if matches!(code, 24 | 25 | 27 | 30 | 36 | 37 | 40) {
                for (i, value) in options.result_vector.iter().enumerate() {
                    pending.push((now, PendingWrite::OutputDouble(base + i as u32, *value)));
                }
            }
            if matches!(code, 22 | 23 | 31 | 34 | 35) {
                pending.push((now, PendingWrite::OutputDouble(base, options.result_scalar)));
            }
            pending.push((done_at, PendingWrite::OutputInt(base, DONE_WITH_CMD)));
        }
    } else if is_command_channel {
        // NOOP clear re-arms readiness.
        pending.push((Instant::now(), PendingWrite::OutputInt(base, RDY_FOR_CMD)));
    }
}

fn apply_io_fields(command: &ReceivedCommand, state: &mut MockState) {
    if let (Some(mask), Some(value)) = (
        command.byte_fields.get("standard_digital_output_mask"),
        command.byte_fields.get("standard_digital_output"),
    ) {
        let mask = *mask as u64;
        let value = *value as u64;
        state.digital_output_bits = (state.digital_output_bits & !mask) | (value & mask);
    }
    if let (Some(mask), Some(value)) = (
        command.byte_fields.get("tool_digital_output_mask"),
        command.byte_fields.get("tool_digital_output"),
    ) {
        state.tool_digital_bits = (state.tool_digital_bits & !mask) | (value & mask);
    }
    if let (Some(mask), Some(fraction)) = (
        command.uint_fields.get("speed_slider_mask"),
        command.double_fields.get("speed_slider_fraction"),
    ) {
        if mask & 1 == 1 {
            state.speed_slider_fraction = *fraction;
        }
    }
    if let Some(mask) = command.byte_fields.get("standard_analog_output_mask") {
        if mask & 1 != 0 {
            if let Some(v) = command.double_fields.get("standard_analog_output_0") {
                state.analog_outputs[0] = *v;
            }
        }
        if mask & 2 != 0 {
            if let Some(v) = command.double_fields.get("standard_analog_output_1") {
                state.analog_outputs[1] = *v;
            }
        }
    }
}

fn serve_script(
    mut stream: TcpStream,
    state: Arc<Mutex<MockState>>,
    options: MockOptions,
    shutdown: Arc<AtomicBool>,
) {
    stream
        .set_read_timeout(Some(Duration::from_millis(5)))
        .unwrap();
    let mut buffer = String::new();
    let mut chunk = [0u8; 4096];
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        match stream.read(&mut chunk) {
            Ok(0) => return,
            Ok(n) => {
                buffer.push_str(&String::from_utf8_lossy(&chunk[..n]));
                while let Some(end) = buffer.find("\nend\n") {
                    let script: String = buffer.drain(..end + 5).collect();
                    process_script(&script, &state, &options);
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {}
            Err(_) => return,
        }
    }
}

fn process_script(script: &str, state: &Arc<Mutex<MockState>>, options: &MockOptions) {
    state.lock().unwrap().uploaded_scripts.push(script.to_string());

    if script.contains("def rtde_control") {
        let base = options.register_base;
        let mut state = state.lock().unwrap();
        state.robot_status_bits |= 0b10;
        state.output_ints.insert(base + 1, -1);
        state.output_ints.insert(base, RDY_FOR_CMD);
        return;
    }
    if script.contains("def rtde_stop") {
        let base = options.register_base;
        let mut state = state.lock().unwrap();
        state.robot_status_bits &= !0b10;
        state.output_ints.insert(base + 1, -1);
        return;
    }

    // One-shot script: run the literal register writes it contains, in
    // order, one per replay step.
    let writes = parse_register_writes(script);
    let state = Arc::clone(state);
    let delay = options.script_replay_delay;
    std::thread::spawn(move || {
        state.lock().unwrap().robot_status_bits |= 0b10;
        for (register, value) in writes {
            std::thread::sleep(delay);
            state.lock().unwrap().output_ints.insert(register, value);
        }
        state.lock().unwrap().robot_status_bits &= !0b10;
    });
}

fn parse_register_writes(script: &str) -> Vec<(u32, i32)> {
    let mut writes = Vec::new();
    for line in script.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("write_output_integer_register(") {
            if let Some(args) = rest.strip_suffix(")") {
                let mut parts = args.splitn(2, ',');
                let register = parts.next().map(str::trim).and_then(|s| s.parse().ok());
                let value = parts.next().map(str::trim).and_then(|s| s.parse().ok());
                if let (Some(register), Some(value)) = (register, value) {
                    writes.push((register, value));
                }
            }
        }
    }
    writes
}
