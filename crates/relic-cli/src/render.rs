use kdl::{KdlDocument, KdlEntry, KdlNode};

use relic_engine::{
    Breakpoint, EngineEvent, Frame, MemoryBlock, OutputStream, PauseReport, RegisterSnapshot,
    StopReason,
};

const BYTES_PER_ROW: usize = 16;

/// Renders an engine event as terminal text.
///
/// Returns `None` for events not worth printing.
pub fn event_to_text(event: &EngineEvent) -> Option<String> {
    let text = match event {
        EngineEvent::Log(message) => format!("[relic] {message}"),
        EngineEvent::Output { stream, text } => {
            let text = text.trim_end_matches(['\r', '\n']);

            match stream {
                OutputStream::Console | OutputStream::Target => text.to_owned(),
                OutputStream::Log => format!("[debugger] {text}"),
                OutputStream::HostStdout => format!("[host] {text}"),
                OutputStream::HostStderr => format!("[host!] {text}"),
            }
        }
        EngineEvent::StateChanged { from, to } => format!("[relic] {from} -> {to}"),
        EngineEvent::Breakpoints(breakpoints) => document_to_text(breakpoints_to_kdl(breakpoints)),
        EngineEvent::Paused(report) => document_to_text(pause_to_kdl(report)),
    };

    (!text.is_empty()).then_some(text)
}

/// Formats a KDL document for display.
pub fn document_to_text(mut kdl: KdlDocument) -> String {
    kdl.autoformat();
    kdl.to_string().trim_end().to_owned()
}

/// Dumps the breakpoint list.
pub fn breakpoints_to_kdl(breakpoints: &[Breakpoint]) -> KdlDocument {
    let mut kdl = KdlDocument::new();

    if breakpoints.is_empty() {
        let mut node = KdlNode::new("breakpoints");
        node.entries_mut().push(KdlEntry::new("<none>"));
        kdl.nodes_mut().push(node);
    }

    for breakpoint in breakpoints {
        let mut node = KdlNode::new("breakpoint");
        let entries = node.entries_mut();

        entries.push(KdlEntry::new(breakpoint.id.as_str()));
        entries.push(KdlEntry::new_prop("addr", breakpoint.address.as_str()));

        if let Some(function) = &breakpoint.function {
            entries.push(KdlEntry::new_prop("func", function.as_str()));
        }

        if let Some(file) = &breakpoint.source_file {
            entries.push(KdlEntry::new_prop("file", file.as_str()));
        }

        if let Some(line) = breakpoint.source_line {
            entries.push(KdlEntry::new_prop("line", i128::from(line)));
        }

        entries.push(KdlEntry::new_prop("enabled", breakpoint.enabled));
        entries.push(KdlEntry::new_prop("hits", i128::from(breakpoint.hit_count)));

        kdl.nodes_mut().push(node);
    }

    kdl
}

/// Dumps register values, in register number order.
pub fn registers_to_kdl(registers: &RegisterSnapshot) -> KdlDocument {
    let mut kdl = KdlDocument::new();

    let mut node = KdlNode::new("registers");

    for (name, value) in &registers.general {
        let mut register = KdlNode::new(name.as_str());
        register.entries_mut().push(KdlEntry::new(value.as_str()));
        node.ensure_children().nodes_mut().push(register);
    }

    kdl.nodes_mut().push(node);
    kdl
}

/// Dumps call stack frames, innermost first.
pub fn frames_to_kdl(frames: &[Frame]) -> KdlDocument {
    let mut kdl = KdlDocument::new();
    kdl.nodes_mut().push(backtrace_node(frames));
    kdl
}

fn backtrace_node(frames: &[Frame]) -> KdlNode {
    let mut node = KdlNode::new("backtrace");

    if frames.is_empty() {
        node.entries_mut().push(KdlEntry::new("<none>"));
    }

    for frame in frames {
        let mut frame_node = KdlNode::new("frame");
        let entries = frame_node.entries_mut();

        entries.push(KdlEntry::new(i128::from(frame.level)));
        entries.push(KdlEntry::new_prop("addr", frame.address.as_str()));

        if let Some(function) = &frame.function {
            entries.push(KdlEntry::new_prop("func", function.as_str()));
        }

        if let Some(file) = &frame.file {
            entries.push(KdlEntry::new_prop("file", file.as_str()));
        }

        if let Some(line) = frame.line {
            entries.push(KdlEntry::new_prop("line", i128::from(line)));
        }

        node.ensure_children().nodes_mut().push(frame_node);
    }

    node
}

/// Dumps a memory block, sixteen bytes per row.
pub fn memory_to_kdl(block: &MemoryBlock) -> KdlDocument {
    let mut kdl = KdlDocument::new();

    let mut node = KdlNode::new("memory");
    node.entries_mut().push(KdlEntry::new(block.begin.as_str()));
    node.entries_mut()
        .push(KdlEntry::new_prop("size", block.len() as i128));

    for row in block.contents.as_bytes().chunks(BYTES_PER_ROW * 2) {
        let bytes = row
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).into_owned())
            .collect::<Vec<_>>()
            .join(" ");

        let mut row_node = KdlNode::new("row");
        row_node.entries_mut().push(KdlEntry::new(bytes));
        node.ensure_children().nodes_mut().push(row_node);
    }

    kdl.nodes_mut().push(node);
    kdl
}

/// Dumps a pause report: stop details, key registers and call stack.
pub fn pause_to_kdl(report: &PauseReport) -> KdlDocument {
    let mut kdl = KdlDocument::new();

    let stop = &report.stop;
    let mut node = KdlNode::new("paused");
    let entries = node.entries_mut();

    entries.push(KdlEntry::new(stop_reason_name(&stop.reason)));

    if !stop.address.is_empty() {
        entries.push(KdlEntry::new_prop("addr", stop.address.as_str()));
    }

    if !stop.function.is_empty() {
        entries.push(KdlEntry::new_prop("func", stop.function.as_str()));
    }

    if !stop.signal_name.is_empty() {
        entries.push(KdlEntry::new_prop("signal", stop.signal_name.as_str()));
    }

    if let Some(id) = &stop.breakpoint_id {
        entries.push(KdlEntry::new_prop("breakpoint", id.as_str()));
    }

    if let Some(thread) = &stop.thread_id {
        entries.push(KdlEntry::new_prop("thread", thread.as_str()));
    }

    let registers = &report.registers;

    for (name, value) in [
        ("pc", &registers.program_counter),
        ("lr", &registers.link_register),
        ("ctr", &registers.counter_register),
    ] {
        if let Some(value) = value {
            let mut register = KdlNode::new(name);
            register.entries_mut().push(KdlEntry::new(value.as_str()));
            node.ensure_children().nodes_mut().push(register);
        }
    }

    node.ensure_children()
        .nodes_mut()
        .push(backtrace_node(&report.backtrace));

    kdl.nodes_mut().push(node);
    kdl
}

fn stop_reason_name(reason: &StopReason) -> &str {
    match reason {
        StopReason::BreakpointHit => "breakpoint-hit",
        StopReason::EndSteppingRange => "end-stepping-range",
        StopReason::SignalReceived => "signal-received",
        StopReason::Exited => "exited",
        StopReason::Other(name) if name.is_empty() => "unknown",
        StopReason::Other(name) => name,
    }
}
