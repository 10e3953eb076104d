//! Embedded control script uploaded to the controller at session start.
//!
//! The script services the register mailbox: it reads the command code from
//! `input_int_register_(offset+0)`, executes the matching URScript call,
//! and acknowledges through `output_int_register_(offset+0)`. The
//! `{{REGISTER_OFFSET}}` token is substituted before upload so the script
//! and the client agree on the register window. Lines prefixed with a
//! `$MN` marker are kept only on controllers of version M.N or newer.

pub(crate) const CONTROL_SCRIPT: &str = r#"def rtde_control():
    reg_offset = {{REGISTER_OFFSET}}
    RDY_FOR_CMD = 1
    DONE_WITH_CMD = 2

    global async_active = False
    global servo_active = False
    global speed_active = False

    def signal_ready():
        write_output_integer_register(reg_offset + 0, RDY_FOR_CMD)
    end

    def signal_done():
        write_output_integer_register(reg_offset + 0, DONE_WITH_CMD)
    end

    def set_progress(index):
        write_output_integer_register(reg_offset + 1, index)
    end

    def read_list(first):
        return [read_input_float_register(reg_offset + first + 0),
                read_input_float_register(reg_offset + first + 1),
                read_input_float_register(reg_offset + first + 2),
                read_input_float_register(reg_offset + first + 3),
                read_input_float_register(reg_offset + first + 4),
                read_input_float_register(reg_offset + first + 5)]
    end

    def read_pose(first):
        q = read_list(first)
        return p[q[0], q[1], q[2], q[3], q[4], q[5]]
    end

    def write_list(values):
        write_output_float_register(reg_offset + 0, values[0])
        write_output_float_register(reg_offset + 1, values[1])
        write_output_float_register(reg_offset + 2, values[2])
        write_output_float_register(reg_offset + 3, values[3])
        write_output_float_register(reg_offset + 4, values[4])
        write_output_float_register(reg_offset + 5, values[5])
    end

    def write_scalar(value):
        write_output_float_register(reg_offset + 0, value)
    end

    thread move_thread():
        set_progress(0)
        if cmd_kind == 1:
            movej(move_target, a = move_acc, v = move_vel)
        elif cmd_kind == 2:
            movel(move_pose, a = move_acc, v = move_vel)
        elif cmd_kind == 3:
            movej(get_inverse_kin(move_pose), a = move_acc, v = move_vel)
        elif cmd_kind == 4:
            movel(move_target, a = move_acc, v = move_vel)
        elif cmd_kind == 5:
            movep(move_pose, a = move_acc, v = move_vel, r = move_blend)
        end
        set_progress(-1)
        async_active = False
    end

    set_progress(-1)
    signal_ready()
    textmsg("rtde control script ready")

    while True:
        cmd = read_input_integer_register(reg_offset + 0)
        if cmd == 0:
            signal_ready()
        elif cmd >= 1 and cmd <= 5:
            global cmd_kind = cmd
            global move_target = read_list(0)
            global move_pose = read_pose(0)
            global move_vel = read_input_float_register(reg_offset + 6)
            global move_acc = read_input_float_register(reg_offset + 7)
            global move_blend = read_input_float_register(reg_offset + 8)
            is_async = read_input_integer_register(reg_offset + 1)
            if is_async == 1:
                async_active = True
                thrd = run move_thread()
                signal_done()
            else:
                thrd = run move_thread()
                join thrd
                signal_done()
            end
        elif cmd == 6:
            via = read_pose(0)
            to = read_pose(6)
            movec(via, to, a = read_input_float_register(reg_offset + 13), v = read_input_float_register(reg_offset + 12), r = read_input_float_register(reg_offset + 14))
            signal_done()
        elif cmd == 7:
            servo_active = True
            servoj(read_list(0), t = read_input_float_register(reg_offset + 8), lookahead_time = read_input_float_register(reg_offset + 9), gain = read_input_float_register(reg_offset + 10))
            signal_done()
        elif cmd == 8:
            servo_active = True
            servol(read_pose(0), t = read_input_float_register(reg_offset + 8))
            signal_done()
        elif cmd == 9:
            speed_active = True
            speedj(read_list(0), a = read_input_float_register(reg_offset + 6), t = read_input_float_register(reg_offset + 7))
            signal_done()
        elif cmd == 10:
            speed_active = True
            speedl(read_list(0), a = read_input_float_register(reg_offset + 6), t = read_input_float_register(reg_offset + 7))
            signal_done()
        elif cmd == 11:
            servoc(read_pose(0), a = read_input_float_register(reg_offset + 7), v = read_input_float_register(reg_offset + 6), r = read_input_float_register(reg_offset + 8))
            signal_done()
        elif cmd == 12:
            sel = [read_input_integer_register(reg_offset + 1), read_input_integer_register(reg_offset + 2), read_input_integer_register(reg_offset + 3), read_input_integer_register(reg_offset + 4), read_input_integer_register(reg_offset + 5), read_input_integer_register(reg_offset + 6)]
            fm_type = read_input_integer_register(reg_offset + 7)
            force_mode(read_pose(0), sel, read_list(6), fm_type, read_list(12))
            signal_done()
        elif cmd == 13:
            end_force_mode()
            signal_done()
        elif cmd == 14:
            zero_ftsensor()
            signal_done()
        elif cmd == 15:
            stopl(read_input_float_register(reg_offset + 0))
            async_active = False
            set_progress(-1)
            signal_done()
        elif cmd == 16:
            stopj(read_input_float_register(reg_offset + 0))
            async_active = False
            set_progress(-1)
            signal_done()
        elif cmd == 17:
            if read_input_integer_register(reg_offset + 1) == 1:
                set_payload(read_input_float_register(reg_offset + 0), [read_input_float_register(reg_offset + 1), read_input_float_register(reg_offset + 2), read_input_float_register(reg_offset + 3)])
            else:
                set_payload(read_input_float_register(reg_offset + 0))
            end
            signal_done()
        elif cmd == 18:
            teach_mode()
            signal_done()
        elif cmd == 19:
            end_teach_mode()
            signal_done()
$50     elif cmd == 20:
$50         force_mode_set_damping(read_input_float_register(reg_offset + 0))
$50         signal_done()
$50     elif cmd == 21:
$50         force_mode_set_gain_scaling(read_input_float_register(reg_offset + 0))
$50         signal_done()
$54     elif cmd == 22:
$54         write_scalar(tool_contact(read_list(0)))
$54         signal_done()
        elif cmd == 23:
            write_scalar(get_steptime())
            signal_done()
        elif cmd == 24:
            write_list(get_actual_joint_positions_history(read_input_integer_register(reg_offset + 1)))
            signal_done()
        elif cmd == 25:
            write_list(get_target_waypoint())
            signal_done()
        elif cmd == 26:
            set_tcp(read_pose(0))
            signal_done()
        elif cmd == 27:
            if read_input_integer_register(reg_offset + 1) == 1:
                write_list(get_inverse_kin(read_pose(0), qnear = read_list(6)))
            else:
                write_list(get_inverse_kin(read_pose(0)))
            end
            signal_done()
        elif cmd == 29:
            protective_stop()
            signal_done()
        elif cmd == 30:
            write_list(pose_trans(read_pose(0), read_pose(6)))
            signal_done()
        elif cmd == 31:
            if is_steady():
                write_scalar(1.0)
            else:
                write_scalar(0.0)
            end
            signal_done()
        elif cmd == 32:
            rtde_set_watchdog("input_int_register_" + to_str(reg_offset), read_input_float_register(reg_offset + 0), "pause")
            signal_done()
        elif cmd == 33:
            signal_done()
        elif cmd == 34:
            if is_within_safety_limits(read_pose(0)):
                write_scalar(1.0)
            else:
                write_scalar(0.0)
            end
            signal_done()
        elif cmd == 35:
            if is_within_safety_limits(read_list(0)):
                write_scalar(1.0)
            else:
                write_scalar(0.0)
            end
            signal_done()
        elif cmd == 36:
            write_list(get_joint_torques())
            signal_done()
        elif cmd == 37:
            write_list(pose_to_list(get_tcp_offset()))
            signal_done()
$54     elif cmd == 38:
$54         if read_input_integer_register(reg_offset + 1) == 1:
$54             jog_start(read_list(0), feature = get_actual_tcp_pose())
$54         else:
$54             jog_start(read_list(0))
$54         end
$54         signal_done()
$54     elif cmd == 39:
$54         jog_stop()
$54         signal_done()
        elif cmd == 40:
            if read_input_integer_register(reg_offset + 1) == 2:
                write_list(pose_to_list(get_forward_kin(read_list(0), tcp = read_pose(6))))
            elif read_input_integer_register(reg_offset + 1) == 1:
                write_list(pose_to_list(get_forward_kin(read_list(0))))
            else:
                write_list(pose_to_list(get_forward_kin()))
            end
            signal_done()
        elif cmd == 42:
            servo_active = False
            stopj(2.0)
            signal_done()
        elif cmd == 43:
            speed_active = False
            stopj(2.0)
            signal_done()
        end
        sync()
    end
end
"#;
