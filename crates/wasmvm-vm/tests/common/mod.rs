//! Shared fixtures for the integration tests.
//!
//! `hackatom()` builds an escrow contract in WAT: `instantiate` stores its
//! message as the config, `execute {"release":{}}` sends the contract's whole
//! balance to the configured beneficiary when the sender is the verifier.

#![allow(dead_code)]

use tempfile::TempDir;
use wasmvm_vm::{VmConfig, VM};

/// Marker returned as response data by a successful release (base64 `8Auq`)
pub const RELEASE_DATA: [u8; 3] = [0xF0, 0x0B, 0xAA];

/// Static byte strings placed in the data segment; each one becomes a pair
/// of globals `$s_<name>` (offset) and `$l_<name>` (length).
const STATICS: &[(&str, &str)] = &[
    ("config_key", "config"),
    ("loop_key", "loop"),
    ("loop_value", "spinning"),
    ("ok_empty", r#"{"ok":{}}"#),
    ("ok_open", r#"{"ok":"#),
    ("close", "}"),
    ("err_no_config", r#"{"error":"config not found"}"#),
    ("err_unauthorized", r#"{"error":"Unauthorized"}"#),
    ("err_open", r#"{"error":""#),
    ("err_close", r#""}"#),
    ("verifier_pat", r#""verifier":""#),
    ("beneficiary_pat", r#""beneficiary":""#),
    ("sender_pat", r#""sender":""#),
    ("address_pat", r#""address":""#),
    ("amount_pat", r#""amount":"#),
    ("cpu_loop", "cpu_loop"),
    ("storage_loop", "storage_loop"),
    ("iterate", "iterate"),
    ("write_pat", "write"),
    ("balance_query", r#"{"bank":{"all_balances":{"address":"contract"}}}"#),
    ("attr_action", "action"),
    ("attr_instantiate", "instantiate"),
    ("attr_release", "release"),
    ("debug_release", "releasing funds"),
    (
        "resp_head",
        r#"{"ok":{"messages":[{"id":0,"msg":{"bank":{"send":{"to_address":""#,
    ),
    ("resp_mid", r#"","amount":"#),
    ("resp_tail", r#"}}},"reply_on":"never"}],"data":"8Auq"}}"#),
    (
        "reply_event",
        r#"{"type":"reply","attributes":[{"key":"handled","value":"true"}]}"#,
    ),
];

const STATICS_BASE: usize = 1024;
const SCRATCH: u32 = 32 * 1024;
const HEAP: u32 = 64 * 1024;

const BODY: &str = r#"
  (import "env" "db_read" (func $db_read (param i32) (result i32)))
  (import "env" "db_write" (func $db_write (param i32 i32)))
  (import "env" "db_scan" (func $db_scan (param i32 i32 i32) (result i32)))
  (import "env" "db_next" (func $db_next (param i32) (result i32)))
  (import "env" "addr_validate" (func $addr_validate (param i32) (result i32)))
  (import "env" "query_chain" (func $query_chain (param i32) (result i32)))
  (import "env" "debug" (func $debug (param i32)))
  (import "env" "add_attribute" (func $add_attribute (param i32 i32)))
  (import "env" "add_event" (func $add_event (param i32)))

  (memory (export "memory") 16)
  (global $heap (mut i32) (i32.const @HEAP))
  (global $scratch i32 (i32.const @SCRATCH))
  (global $out_end (mut i32) (i32.const @SCRATCH))
  (global $field_len (mut i32) (i32.const 0))

  (func $allocate (export "allocate") (param $size i32) (result i32)
    (local $region i32)
    (local.set $region (global.get $heap))
    (i32.store (local.get $region) (i32.add (local.get $region) (i32.const 12)))
    (i32.store offset=4 (local.get $region) (local.get $size))
    (i32.store offset=8 (local.get $region) (i32.const 0))
    (global.set $heap
      (i32.add (global.get $heap) (i32.add (local.get $size) (i32.const 12))))
    (local.get $region))

  (func (export "deallocate") (param i32))

  ;; region header over bytes that already live in memory
  (func $region (param $ptr i32) (param $len i32) (result i32)
    (local $r i32)
    (local.set $r (call $allocate (i32.const 0)))
    (i32.store (local.get $r) (local.get $ptr))
    (i32.store offset=4 (local.get $r) (local.get $len))
    (i32.store offset=8 (local.get $r) (local.get $len))
    (local.get $r))

  (func $find (param $h i32) (param $hl i32) (param $n i32) (param $nl i32) (result i32)
    (local $i i32) (local $j i32)
    (block $not_found
      (loop $outer
        (br_if $not_found
          (i32.gt_s (i32.add (local.get $i) (local.get $nl)) (local.get $hl)))
        (local.set $j (i32.const 0))
        (block $mismatch
          (loop $inner
            (if (i32.ge_u (local.get $j) (local.get $nl))
              (then (return (local.get $i))))
            (br_if $mismatch
              (i32.ne
                (i32.load8_u (i32.add (local.get $h) (i32.add (local.get $i) (local.get $j))))
                (i32.load8_u (i32.add (local.get $n) (local.get $j)))))
            (local.set $j (i32.add (local.get $j) (i32.const 1)))
            (br $inner)))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $outer)))
    (i32.const -1))

  (func $contains (param $r i32) (param $n i32) (param $nl i32) (result i32)
    (i32.ge_s
      (call $find (i32.load (local.get $r)) (i32.load offset=8 (local.get $r))
                  (local.get $n) (local.get $nl))
      (i32.const 0)))

  ;; pointer to the string value following a `"key":"` pattern; length in $field_len
  (func $field (param $r i32) (param $n i32) (param $nl i32) (result i32)
    (local $h i32) (local $idx i32) (local $start i32) (local $end i32) (local $stop i32)
    (local.set $h (i32.load (local.get $r)))
    (local.set $idx
      (call $find (local.get $h) (i32.load offset=8 (local.get $r)) (local.get $n) (local.get $nl)))
    (if (i32.lt_s (local.get $idx) (i32.const 0))
      (then
        (global.set $field_len (i32.const 0))
        (return (i32.const 0))))
    (local.set $start (i32.add (local.get $h) (i32.add (local.get $idx) (local.get $nl))))
    (local.set $stop (i32.add (local.get $h) (i32.load offset=8 (local.get $r))))
    (local.set $end (local.get $start))
    (block $done
      (loop $scan
        (br_if $done (i32.ge_u (local.get $end) (local.get $stop)))
        (br_if $done (i32.eq (i32.load8_u (local.get $end)) (i32.const 34)))
        (local.set $end (i32.add (local.get $end) (i32.const 1)))
        (br $scan)))
    (global.set $field_len (i32.sub (local.get $end) (local.get $start)))
    (local.get $start))

  (func $eq (param $a i32) (param $al i32) (param $b i32) (param $bl i32) (result i32)
    (local $i i32)
    (if (i32.ne (local.get $al) (local.get $bl)) (then (return (i32.const 0))))
    (block $done
      (loop $cmp
        (br_if $done (i32.ge_u (local.get $i) (local.get $al)))
        (if (i32.ne (i32.load8_u (i32.add (local.get $a) (local.get $i)))
                    (i32.load8_u (i32.add (local.get $b) (local.get $i))))
          (then (return (i32.const 0))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $cmp)))
    (i32.const 1))

  (func $append (param $src i32) (param $len i32)
    (local $i i32)
    (block $done
      (loop $copy
        (br_if $done (i32.ge_u (local.get $i) (local.get $len)))
        (i32.store8 (i32.add (global.get $out_end) (local.get $i))
                    (i32.load8_u (i32.add (local.get $src) (local.get $i))))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $copy)))
    (global.set $out_end (i32.add (global.get $out_end) (local.get $len))))

  (func $output (result i32)
    (call $region (global.get $scratch) (i32.sub (global.get $out_end) (global.get $scratch))))

  (func $read_be (param $p i32) (result i32)
    (i32.or
      (i32.or (i32.shl (i32.load8_u (local.get $p)) (i32.const 24))
              (i32.shl (i32.load8_u offset=1 (local.get $p)) (i32.const 16)))
      (i32.or (i32.shl (i32.load8_u offset=2 (local.get $p)) (i32.const 8))
              (i32.load8_u offset=3 (local.get $p)))))

  ;; every stored record becomes an attribute, in ascending key order
  (func $iterate
    (local $it i32) (local $rec i32) (local $ptr i32) (local $len i32) (local $klen i32)
    (local.set $it (call $db_scan (i32.const 0) (i32.const 0) (i32.const 1)))
    (block $done
      (loop $next
        (local.set $rec (call $db_next (local.get $it)))
        (local.set $len (i32.load offset=8 (local.get $rec)))
        (br_if $done (i32.eqz (local.get $len)))
        (local.set $ptr (i32.load (local.get $rec)))
        (local.set $klen
          (call $read_be (i32.sub (i32.add (local.get $ptr) (local.get $len)) (i32.const 4))))
        (call $add_attribute
          (call $region (local.get $ptr) (local.get $klen))
          (call $region (i32.add (local.get $ptr) (local.get $klen))
                        (i32.sub (i32.sub (local.get $len) (local.get $klen)) (i32.const 4))))
        (br $next))))

  (func (export "instantiate") (param $env i32) (param $info i32) (param $msg i32) (result i32)
    (call $db_write (call $region @config_key) (local.get $msg))
    (call $add_attribute (call $region @attr_action) (call $region @attr_instantiate))
    (call $region @ok_empty))

  (func (export "execute") (param $env i32) (param $info i32) (param $msg i32) (result i32)
    (local $key i32) (local $value i32)
    (local $config i32) (local $bal i32)
    (local $ver i32) (local $ver_len i32)
    (local $ben i32) (local $ben_len i32)
    (local $sender i32) (local $sender_len i32)
    (local $arr i32) (local $arr_len i32)

    (if (call $contains (local.get $msg) @cpu_loop)
      (then (loop $spin (br $spin))))

    (if (call $contains (local.get $msg) @storage_loop)
      (then
        (local.set $key (call $region @loop_key))
        (local.set $value (call $region @loop_value))
        (loop $write
          (call $db_write (local.get $key) (local.get $value))
          (br $write))))

    (if (call $contains (local.get $msg) @iterate)
      (then
        (call $iterate)
        (return (call $region @ok_empty))))

    (local.set $config (call $db_read (call $region @config_key)))
    (if (i32.eqz (local.get $config))
      (then (return (call $region @err_no_config))))

    (local.set $ver (call $field (local.get $config) @verifier_pat))
    (local.set $ver_len (global.get $field_len))
    (local.set $ben (call $field (local.get $config) @beneficiary_pat))
    (local.set $ben_len (global.get $field_len))
    (local.set $sender (call $field (local.get $info) @sender_pat))
    (local.set $sender_len (global.get $field_len))
    (if (i32.or
          (i32.eqz (local.get $ver_len))
          (i32.eqz (call $eq (local.get $ver) (local.get $ver_len)
                             (local.get $sender) (local.get $sender_len))))
      (then (return (call $region @err_unauthorized))))

    (local.set $bal (call $query_chain (call $region @balance_query)))
    (local.set $arr
      (i32.add
        (i32.add (i32.load (local.get $bal))
                 (call $find (i32.load (local.get $bal)) (i32.load offset=8 (local.get $bal)) @amount_pat))
        (global.get $l_amount_pat)))
    ;; strip the closing braces of the response, contract result and system result
    (local.set $arr_len
      (i32.sub
        (i32.sub (i32.add (i32.load (local.get $bal)) (i32.load offset=8 (local.get $bal)))
                 (local.get $arr))
        (i32.const 3)))

    (call $add_attribute (call $region @attr_action) (call $region @attr_release))
    (call $debug (call $region @debug_release))

    (global.set $out_end (global.get $scratch))
    (call $append @resp_head)
    (call $append (local.get $ben) (local.get $ben_len))
    (call $append @resp_mid)
    (call $append (local.get $arr) (local.get $arr_len))
    (call $append @resp_tail)
    (call $output))

  (func (export "query") (param $env i32) (param $msg i32) (result i32)
    (local $config i32)
    (if (call $contains (local.get $msg) @write_pat)
      (then (call $db_write (call $region @config_key) (local.get $msg))))
    (local.set $config (call $db_read (call $region @config_key)))
    (if (i32.eqz (local.get $config))
      (then (return (call $region @err_no_config))))
    (global.set $out_end (global.get $scratch))
    (call $append @ok_open)
    (call $append (i32.load (local.get $config)) (i32.load offset=8 (local.get $config)))
    (call $append @close)
    (call $output))

  (func (export "migrate") (param $env i32) (param $msg i32) (result i32)
    (call $db_write (call $region @config_key) (local.get $msg))
    (call $region @ok_empty))

  ;; validates the "address" field of the message through the host API
  (func (export "sudo") (param $env i32) (param $msg i32) (result i32)
    (local $addr i32) (local $err i32)
    (local.set $addr (call $field (local.get $msg) @address_pat))
    (local.set $err (call $addr_validate (call $region (local.get $addr) (global.get $field_len))))
    (if (i32.eqz (local.get $err))
      (then (return (call $region @ok_empty))))
    (global.set $out_end (global.get $scratch))
    (call $append @err_open)
    (call $append (i32.load (local.get $err)) (i32.load offset=8 (local.get $err)))
    (call $append @err_close)
    (call $output))

  (func (export "reply") (param $env i32) (param $msg i32) (result i32)
    (call $add_event (call $region @reply_event))
    (call $region @ok_empty))
"#;

fn escape(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("\\{:02x}", b)).collect()
}

/// Render the escrow contract as WAT text.
pub fn hackatom_wat() -> String {
    let mut globals = String::new();
    let mut data = String::new();
    let mut body = BODY
        .replace("@HEAP", &HEAP.to_string())
        .replace("@SCRATCH", &SCRATCH.to_string());

    let mut offset = STATICS_BASE;
    for (name, value) in STATICS {
        globals.push_str(&format!(
            "  (global $s_{name} i32 (i32.const {offset}))\n  (global $l_{name} i32 (i32.const {len}))\n",
            len = value.len()
        ));
        data.push_str(&format!("  (data (i32.const {offset}) \"{}\")\n", escape(value.as_bytes())));
        body = body.replace(
            &format!("@{name})"),
            &format!("(global.get $s_{name}) (global.get $l_{name}))"),
        );
        offset += value.len() + 1;
    }
    assert!(offset < SCRATCH as usize, "statics overflow the scratch area");

    format!("(module\n{body}\n{globals}\n{data})")
}

pub fn hackatom() -> Vec<u8> {
    wat::parse_str(hackatom_wat()).expect("hackatom contract must compile")
}

/// A contract whose `query` declares the given capabilities.
pub fn contract_requiring(capabilities: &[&str]) -> Vec<u8> {
    let markers: String = capabilities
        .iter()
        .map(|c| format!("(func (export \"requires_{c}\"))\n"))
        .collect();
    let wat = format!(
        r#"(module
            (memory (export "memory") 1)
            (func (export "allocate") (param i32) (result i32) (i32.const 0))
            (func (export "deallocate") (param i32))
            (func (export "query") (param i32 i32) (result i32) (i32.const 0))
            {markers})"#
    );
    wat::parse_str(wat).expect("contract must compile")
}

pub fn setup_vm() -> (TempDir, VM) {
    let dir = TempDir::new().expect("temp dir");
    let vm = VM::new(VmConfig::with_data_dir(dir.path())).expect("vm");
    (dir, vm)
}
