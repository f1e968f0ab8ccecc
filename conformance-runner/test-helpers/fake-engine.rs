// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A stand-in for a language engine, used for testing.
//!
//! It is invoked as `fake-engine <test file>` and follows the instructions in the test file, one
//! per line:
//!
//! * `print <text>` writes a line to stdout.
//! * `eprint <text>` writes a line to stderr.
//! * `sleep <ms>` sleeps.
//! * `alloc <MiB>` allocates and touches memory, and keeps it until exit.
//! * `orphan <ms>` starts a copy of itself that sleeps while holding on to stdout, and does not
//!   wait for it.
//! * `pidfile <path>` writes the process ID to a file.
//! * `exit <code>` exits immediately.
//!
//! Other lines are ignored. Reaching the end of the file exits with code 0.

use std::{
    env, fs,
    io::Write,
    process::{Command, Stdio, exit},
    thread,
    time::Duration,
};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() == 3 && args[1] == "--sleep" {
        sleep_ms(&args[2]);
        return;
    }
    if args.len() != 2 {
        eprintln!("[fake-engine] usage: fake-engine <test file>");
        exit(2);
    }

    let contents = match fs::read_to_string(&args[1]) {
        Ok(contents) => contents,
        Err(err) => {
            eprintln!("[fake-engine] failed to read {}: {err}", args[1]);
            exit(3);
        }
    };

    let mut allocations: Vec<Vec<u8>> = Vec::new();
    for line in contents.lines() {
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "print" => {
                println!("{rest}");
                std::io::stdout().flush().unwrap();
            }
            "eprint" => eprintln!("{rest}"),
            "sleep" => sleep_ms(rest),
            "alloc" => {
                let mib: usize = rest.trim().parse().expect("alloc takes a number of MiB");
                // Touch every page so the memory counts towards the resident set.
                allocations.push(vec![1u8; mib * 1024 * 1024]);
            }
            "orphan" => {
                Command::new(&args[0])
                    .args(["--sleep", rest.trim()])
                    .stdin(Stdio::null())
                    .spawn()
                    .expect("spawning a copy of fake-engine succeeds");
            }
            "pidfile" => {
                fs::write(rest.trim(), std::process::id().to_string())
                    .expect("writing the pid file succeeds");
            }
            "exit" => {
                let code: i32 = rest.trim().parse().expect("exit takes an exit code");
                exit(code);
            }
            _ => {}
        }
    }

    drop(allocations);
}

fn sleep_ms(ms: &str) {
    let ms: u64 = ms.trim().parse().expect("sleep takes a number of milliseconds");
    thread::sleep(Duration::from_millis(ms));
}
